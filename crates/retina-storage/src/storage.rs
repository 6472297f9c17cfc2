//! 影像文件存储管理

use retina_core::utils::unique_filename;
use retina_core::Result;
use std::path::{Path, PathBuf};
use tracing::warn;

/// 文件存储管理器
///
/// 上传文件写入主存储目录，并在配置了Web目录时复制一份供静态服务。
/// 两次写入不构成原子操作，部分失败可能导致两处内容不一致。
#[derive(Debug, Clone)]
pub struct FileStore {
    upload_dir: PathBuf,
    web_dir: Option<PathBuf>,
}

impl FileStore {
    pub fn new(upload_dir: impl Into<PathBuf>, web_dir: Option<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            web_dir,
        }
    }

    /// 确保存储目录存在
    pub async fn ensure_dirs(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        if let Some(web_dir) = &self.web_dir {
            tokio::fs::create_dir_all(web_dir).await?;
        }
        Ok(())
    }

    /// 保存文件内容，返回生成的唯一存储名
    pub async fn save(&self, original_name: &str, data: &[u8]) -> Result<String> {
        let stored_name = unique_filename(original_name);

        let primary = self.upload_dir.join(&stored_name);
        tokio::fs::write(&primary, data).await?;

        if let Some(web_dir) = &self.web_dir {
            tokio::fs::write(web_dir.join(&stored_name), data).await?;
        }

        Ok(stored_name)
    }

    /// 读取已存储的文件内容
    pub async fn read(&self, stored_name: &str) -> Result<Vec<u8>> {
        let data = tokio::fs::read(self.upload_dir.join(stored_name)).await?;
        Ok(data)
    }

    /// 从主目录和Web目录删除文件，文件不存在时忽略
    pub async fn delete(&self, stored_name: &str) -> Result<()> {
        remove_if_exists(&self.upload_dir.join(stored_name)).await?;
        if let Some(web_dir) = &self.web_dir {
            remove_if_exists(&web_dir.join(stored_name)).await?;
        }
        Ok(())
    }

    /// 主目录中是否存在该文件
    pub fn exists(&self, stored_name: &str) -> bool {
        self.upload_dir.join(stored_name).exists()
    }

    /// 主存储目录中的完整路径
    pub fn path_of(&self, stored_name: &str) -> PathBuf {
        self.upload_dir.join(stored_name)
    }

    pub fn web_dir(&self) -> Option<&Path> {
        self.web_dir.as_deref()
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("File already missing on delete: {}", path.display());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
