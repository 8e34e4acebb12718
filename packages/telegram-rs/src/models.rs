use serde::Deserialize;

/// Envelope every Bot API method returns.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
}

/// A sent message (`sendMessage` / `sendDocument` result).
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
}

/// File metadata from `getFile`; `file_path` is relative to the
/// bot file endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct File {
    pub file_id: String,
    #[serde(default)]
    pub file_size: Option<i64>,
    pub file_path: Option<String>,
}
