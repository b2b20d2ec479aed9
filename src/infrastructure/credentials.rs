// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::repositories::storage_repository::StorageError;
use crate::engines::traits::SessionCookie;

/// 凭据文件格式：Cookie 数组，或包含 `cookies` 字段的对象
#[derive(Deserialize)]
#[serde(untagged)]
enum CredentialFile {
    List(Vec<SessionCookie>),
    Wrapped { cookies: Vec<SessionCookie> },
}

/// 加载 Cookie 凭据
///
/// 文件不存在时返回空列表并记录警告；内容无法解析时返回错误。
pub async fn load_credentials(path: impl AsRef<Path>) -> Result<Vec<SessionCookie>, StorageError> {
    let path = path.as_ref();
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Credential file {} not found, continuing without cookies", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let file: CredentialFile = serde_json::from_slice(&raw)
        .map_err(|e| StorageError::Other(format!("invalid credential file: {}", e)))?;
    let cookies = match file {
        CredentialFile::List(cookies) | CredentialFile::Wrapped { cookies } => cookies,
    };
    info!("Loaded {} cookies from {}", cookies.len(), path.display());
    Ok(cookies)
}

/// 保存会话当前的 Cookie，供下次启动使用
pub async fn save_credentials(
    path: impl AsRef<Path>,
    cookies: &[SessionCookie],
) -> Result<(), StorageError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let payload =
        serde_json::to_vec_pretty(cookies).map_err(|e| StorageError::Other(e.to_string()))?;
    tokio::fs::write(path, payload).await?;
    Ok(())
}
