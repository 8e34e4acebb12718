pub mod deps;
pub mod jobs;
pub mod test_dependencies;
pub mod traits;

pub use deps::{GithubAdapter, ServerDeps, TelegramAdapter};
pub use traits::{BaseNotifier, BaseSourceControl, BaseUserStore};
