//! 上传表单与 multipart 文件接收处理器。
//!
//! 上传文件名直接取自客户端且不做任何清理，可能包含路径分隔符或 `..`，
//! 同名文件被直接截断覆盖。并发上传同名文件时以最后完成写入者为准。

use axum::extract::multipart::{Field, Multipart, MultipartRejection};
use axum::extract::Extension;
use axum::response::Response;
use futures_util::stream::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::{RECEIVE_PATH, UPLOAD_FIELD};
use crate::error::AppError;
use crate::html::{self, escape_html};
use crate::storage::Storage;

/// 返回上传表单页面。
pub async fn upload_form() -> Response {
    html::page(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>dirshare upload</title>
</head>
<body>
<h4>Choose a file to upload</h4>
<form action="{RECEIVE_PATH}" method="post" enctype="multipart/form-data">
  <input type="file" name="{UPLOAD_FIELD}" id="{UPLOAD_FIELD}">
  <br> <br>
  <input type="submit" name="submit" value="Submit">
</form>
</body>
</html>
"#
    ))
}

/// 接收 multipart 表单中的 `file` 字段并写入工作目录。
pub async fn receive_upload(
    Extension(storage): Extension<Arc<Storage>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let mut multipart = multipart.map_err(|err| AppError::BadRequest(err.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(err.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Err(AppError::BadRequest("uploaded field has no file name".into())),
        };
        if has_path_components(&file_name) {
            warn!(file_name, "upload file name contains path components, writing it verbatim");
        }

        let target = storage.upload_target(&file_name);
        let written = write_field(&target, field).await?;
        info!(file_name, bytes = written, "file received");

        return Ok(html::page(format!(
            "<!DOCTYPE html>\n<html>\n<body>\nFile uploaded successfully: {}\n<p><a href=\"/\">Back</a></p>\n</body>\n</html>\n",
            escape_html(&file_name)
        )));
    }

    Err(AppError::BadRequest(format!(
        "multipart form has no `{UPLOAD_FIELD}` field"
    )))
}

/// 将字段内容流式写入目标文件；已写入的部分在失败时保留。
async fn write_field(target: &Path, mut field: Field<'_>) -> Result<u64, AppError> {
    let mut file = File::create(target).await.map_err(|err| {
        AppError::Internal(format!(
            "unable to create the file for writing, check your write access privilege: {err}"
        ))
    })?;

    let mut written: u64 = 0;
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|err| AppError::BadRequest(err.body_text()))?;
        if chunk.is_empty() {
            continue;
        }
        file.write_all(&chunk)
            .await
            .map_err(|err| AppError::Internal(format!("failed to write uploaded file: {err}")))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|err| AppError::Internal(format!("failed to write uploaded file: {err}")))?;
    Ok(written)
}

fn has_path_components(file_name: &str) -> bool {
    file_name.contains(['/', '\\']) || file_name == ".." || file_name == "."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_names_with_path_components() {
        assert!(has_path_components("../escape.txt"));
        assert!(has_path_components("dir\\file"));
        assert!(has_path_components(".."));
        assert!(!has_path_components("report.csv"));
        assert!(!has_path_components("..hidden"));
    }

    #[tokio::test]
    async fn form_posts_file_field_to_receiver() {
        use http_body_util::BodyExt;

        let response = upload_form().await;
        let body = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let body = String::from_utf8_lossy(&body);
        assert!(body.contains(r#"action="/fs-receive""#));
        assert!(body.contains(r#"enctype="multipart/form-data""#));
        assert!(body.contains(r#"type="file" name="file""#));
    }
}
