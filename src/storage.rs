use chrono::{DateTime, Utc};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tokio::fs;
use tokio::io::ErrorKind;
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// 将已解码的请求路径解析到根目录之下。
    ///
    /// `..` 与绝对路径直接拒绝；符号链接会被跟随，但规范化后的目标必须仍位于根目录内。
    pub async fn resolve_path_checked(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let target = self.resolve(relative)?;
        let root = fs::canonicalize(&self.root).await?;
        let real = canonicalize_target(&target).await?;
        if !real.starts_with(&root) {
            return Err(StorageError::InvalidPath);
        }
        Ok(target)
    }

    /// 上传文件的落盘位置：客户端文件名原样拼接，不做穿越或覆盖保护。
    pub fn upload_target(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let mut normalized = PathBuf::new();
        let trimmed = relative.trim_start_matches(['/', '\\']);
        for component in Path::new(trimmed).components() {
            match component {
                Component::Normal(segment) => normalized.push(segment),
                Component::CurDir => continue,
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::InvalidPath);
                }
            }
        }

        Ok(self.root.join(normalized))
    }

    /// 每次调用都重新读取目录，按名称排序返回。
    ///
    /// 读取过程中消失的条目、指向根目录之外的链接以及非 UTF-8 名称都不会出现在结果中。
    pub async fn list_dir(&self, dir: &Path) -> Result<Vec<DirectoryEntry>, StorageError> {
        let root = fs::canonicalize(&self.root).await?;
        let mut reader = fs::read_dir(dir).await?;
        let mut entries = Vec::new();

        while let Some(entry) = reader.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!(name = ?raw, "skipping entry with non-UTF-8 name");
                    continue;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(StorageError::Io(err)),
            };
            if file_type.is_symlink() {
                match fs::canonicalize(&path).await {
                    Ok(real) if real.starts_with(&root) => {}
                    Ok(_) => {
                        debug!(name = %name, "skipping symlink outside the served root");
                        continue;
                    }
                    Err(err) => {
                        debug!(name = %name, error = %err, "skipping unresolvable symlink");
                        continue;
                    }
                }
            }
            let metadata = match fs::metadata(&path).await {
                Ok(metadata) => metadata,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(StorageError::Io(err)),
            };
            let modified = metadata
                .modified()
                .ok()
                .and_then(|ts| ts.duration_since(UNIX_EPOCH).ok())
                .map(format_timestamp);

            entries.push(DirectoryEntry {
                name,
                is_dir: metadata.is_dir(),
                size: metadata.len(),
                modified,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

// 中间段不是目录时按不存在处理。
async fn canonicalize_target(target: &Path) -> Result<PathBuf, StorageError> {
    match fs::canonicalize(target).await {
        Ok(real) => Ok(real),
        Err(err) if err.kind() == ErrorKind::NotADirectory => {
            Err(StorageError::Io(io::Error::from(ErrorKind::NotFound)))
        }
        Err(err) => Err(StorageError::Io(err)),
    }
}

fn format_timestamp(duration: Duration) -> String {
    let timestamp = UNIX_EPOCH + duration;
    let datetime: DateTime<Utc> = timestamp.into();
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(Debug)]
pub enum StorageError {
    InvalidPath,
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}

#[derive(Clone, Debug)]
pub struct DirectoryEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<String>,
}
