pub mod delete_repo;
pub mod download_repo;
pub mod send_notification;
pub mod upload_repo;

pub use delete_repo::DeleteRepoJob;
pub use download_repo::DownloadRepoJob;
pub use send_notification::SendNotificationJob;
pub use upload_repo::UploadRepoJob;
