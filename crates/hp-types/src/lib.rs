pub mod errors;
pub mod run;
pub mod space;

pub use errors::*;
pub use run::*;
pub use space::*;
