use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::warn;

use crate::utils::PaperResult;

/// 读取JSON产物，文件不存在时返回 None
pub fn read_json<T: DeserializeOwned>(path: &Path) -> PaperResult<Option<T>> {
    match read_text(path)? {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

/// 缺失或损坏的JSON都退化为默认值
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match read_json(path) {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(e) => {
            warn!("读取 {} 失败，使用空数据: {}", path.display(), e);
            T::default()
        }
    }
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> PaperResult<()> {
    let content = serde_json::to_string_pretty(value)?;
    write_text(path, &content)
}

pub fn read_text(path: &Path) -> PaperResult<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// 写文本，必要时创建父目录
pub fn write_text(path: &Path, content: &str) -> PaperResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
