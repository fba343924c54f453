mod types;
pub use types::Settings;

mod utils;
pub use utils::init_logger;
