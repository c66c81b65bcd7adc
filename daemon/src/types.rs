use serde::{Deserialize, Serialize};

/// Capacity figures reported by `operations/about`, in bytes.
///
/// Providers omit fields they do not track, so every figure is optional on
/// the wire.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capacity {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub used: Option<u64>,
    #[serde(default)]
    pub free: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: String,
    #[serde(default, rename = "goVersion")]
    pub go_version: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
}

/// One entry of an `operations/list` reply.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct DirEntry {
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub mod_time: Option<String>,
    #[serde(default)]
    pub is_dir: bool,
}

// -----------------------------------------------------------------------------
// RPC bodies
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct FsRequest<'a> {
    pub fs: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NameRequest<'a> {
    pub name: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListRemotesResponse {
    #[serde(default)]
    pub remotes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListEntriesResponse {
    #[serde(default)]
    pub list: Vec<DirEntry>,
}

/// `remote` -> `remote:`, leaving an already qualified name alone.
pub fn fs_name(remote: &str) -> String {
    if remote.ends_with(':') {
        remote.to_string()
    } else {
        format!("{}:", remote)
    }
}
