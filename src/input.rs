pub mod config;
pub mod namelist;
pub mod schema;

pub use self::config::RunConfig;
pub use self::namelist::ParsedInput;
