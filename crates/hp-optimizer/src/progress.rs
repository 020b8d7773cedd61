//! Console progress banners.

use hp_types::TrialIndex;

const RULE: &str = "###################";

/// Banner for one finished evaluation.
///
/// `accuracy` is a fraction and printed as a percentage.
pub fn format_iteration(trial_index: TrialIndex, loss: f64, accuracy: Option<f64>) -> String {
    let metrics = match accuracy {
        Some(acc) => format!("loss: {loss:.4} acc: {:.2}%", acc * 100.0),
        None => format!("loss: {loss:.4}"),
    };
    format!("\n{RULE}\n# evaluation{trial_index: >5} #\n{RULE}\n{metrics}")
}

pub fn print_iteration(trial_index: TrialIndex, loss: f64, accuracy: Option<f64>) {
    println!("{}", format_iteration(trial_index, loss, accuracy));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_without_accuracy() {
        let text = format_iteration(3, 0.123456, None);
        assert_eq!(
            text,
            "\n###################\n# evaluation    3 #\n###################\nloss: 0.1235"
        );
    }

    #[test]
    fn banner_with_accuracy() {
        let text = format_iteration(12345, 1.5, Some(0.9321));
        assert!(text.contains("# evaluation12345 #"));
        assert!(text.ends_with("loss: 1.5000 acc: 93.21%"));
    }
}
