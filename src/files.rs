//! 目录列表与文件下载处理器。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path as RoutePath};
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use httpdate::fmt_http_date;
use std::fs::Metadata;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::config::UPLOAD_FORM_PATH;
use crate::error::AppError;
use crate::etag::{etag_from_metadata, if_range_matches, is_not_modified};
use crate::html::{self, encode_path_segment, escape_html, format_size};
use crate::storage::{DirectoryEntry, Storage, StorageError};

/// 目录列表页的渲染选项，由路由按模式注入。
#[derive(Clone, Copy, Debug)]
pub struct ListingStyle {
    pub upload_banner: bool,
}

/// 服务根目录。
pub async fn serve_root(
    uri: Uri,
    headers: HeaderMap,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(style): Extension<ListingStyle>,
) -> Result<Response, AppError> {
    respond(&storage, style, "", &uri, &headers).await
}

/// 服务根目录下的任意路径（已由路由完成百分号解码）。
pub async fn serve_path(
    RoutePath(path): RoutePath<String>,
    uri: Uri,
    headers: HeaderMap,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(style): Extension<ListingStyle>,
) -> Result<Response, AppError> {
    respond(&storage, style, &path, &uri, &headers).await
}

async fn respond(
    storage: &Storage,
    style: ListingStyle,
    relative: &str,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<Response, AppError> {
    let request_path = uri.path();
    let target = storage.resolve_path_checked(relative).await?;
    let metadata = fs::metadata(&target).await.map_err(StorageError::from)?;

    if metadata.is_dir() {
        if !request_path.ends_with('/') {
            return redirect(&format!("{request_path}/"), uri);
        }
        let entries = storage.list_dir(&target).await?;
        info!(path = relative, count = entries.len(), "list directory");
        let display_path = format!("/{}", relative.trim_start_matches('/'));
        return Ok(html::page(render_listing(&display_path, &entries, style)));
    }

    if request_path.len() > 1 && request_path.ends_with('/') {
        return redirect(request_path.trim_end_matches('/'), uri);
    }
    serve_file(&target, &metadata, headers).await
}

fn redirect(location: &str, uri: &Uri) -> Result<Response, AppError> {
    let location = match uri.query() {
        Some(query) => format!("{location}?{query}"),
        None => location.to_string(),
    };
    let value = HeaderValue::from_str(&location)
        .map_err(|_| AppError::BadRequest("invalid redirect target".into()))?;
    Ok((StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, value)]).into_response())
}

/// 渲染目录列表页；组合模式下在页首附加上传入口。
pub fn render_listing(display_path: &str, entries: &[DirectoryEntry], style: ListingStyle) -> String {
    let title = escape_html(display_path);
    let mut page = String::with_capacity(512 + entries.len() * 128);
    page.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    page.push_str(&format!("<title>Index of {title}</title>\n</head>\n<body>\n"));
    if style.upload_banner {
        page.push_str(&format!(
            "<p class=\"upload\"><a href=\"{UPLOAD_FORM_PATH}\">Upload a file</a> to this server</p>\n<hr>\n"
        ));
    }
    page.push_str(&format!("<h3>Index of {title}</h3>\n<table>\n"));
    page.push_str("<tr><th>Name</th><th>Size</th><th>Modified</th></tr>\n");
    if display_path != "/" {
        page.push_str("<tr><td><a href=\"../\">../</a></td><td></td><td></td></tr>\n");
    }
    for entry in entries {
        let suffix = if entry.is_dir { "/" } else { "" };
        let size = if entry.is_dir {
            String::new()
        } else {
            format_size(entry.size)
        };
        page.push_str(&format!(
            "<tr><td><a href=\"{}{suffix}\">{}{suffix}</a></td><td>{}</td><td>{}</td></tr>\n",
            encode_path_segment(&entry.name),
            escape_html(&entry.name),
            size,
            entry.modified.as_deref().unwrap_or(""),
        ));
    }
    page.push_str("</table>\n</body>\n</html>\n");
    page
}

/// 下载文件，支持 Range 请求与缓存相关头。
async fn serve_file(
    target: &Path,
    metadata: &Metadata,
    request_headers: &HeaderMap,
) -> Result<Response, AppError> {
    let file_size = metadata.len();
    let modified = metadata.modified().ok();
    let etag = etag_from_metadata(metadata);
    let mime = mime_guess::from_path(target).first_or_octet_stream();

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str())
            .map_err(|_| AppError::Internal("invalid mime type".into()))?,
    );
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some(value) = modified.map(fmt_http_date) {
        response_headers.insert(
            header::LAST_MODIFIED,
            HeaderValue::from_str(&value)
                .map_err(|_| AppError::Internal("failed to build response headers".into()))?,
        );
    }
    response_headers.insert(
        header::ETAG,
        HeaderValue::from_str(&etag)
            .map_err(|_| AppError::Internal("failed to build response headers".into()))?,
    );

    if is_not_modified(request_headers, &etag, modified) {
        return Ok((StatusCode::NOT_MODIFIED, response_headers).into_response());
    }

    let range = if if_range_matches(request_headers, modified) {
        parse_range(request_headers.get(header::RANGE), file_size)?
    } else {
        None
    };

    let mut file = File::open(target).await.map_err(StorageError::from)?;

    if let Some((start, end)) = range {
        let length = end - start + 1;
        debug!(start, end, length, "download range request accepted");
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|err| AppError::Internal(err.to_string()))?;
        let stream = ReaderStream::new(file.take(length));
        response_headers.insert(
            header::CONTENT_RANGE,
            HeaderValue::from_str(&format!("bytes {}-{}/{}", start, end, file_size))
                .map_err(|_| AppError::Internal("failed to build response headers".into()))?,
        );
        response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        return Ok((
            StatusCode::PARTIAL_CONTENT,
            response_headers,
            AxumBody::from_stream(stream),
        )
            .into_response());
    }

    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file_size));
    info!(size = file_size, "download full file");
    let stream = ReaderStream::new(file);
    Ok((
        StatusCode::OK,
        response_headers,
        AxumBody::from_stream(stream),
    )
        .into_response())
}

/// 解析 Range 头，返回可读取的范围。
fn parse_range(
    value: Option<&HeaderValue>,
    file_size: u64,
) -> Result<Option<(u64, u64)>, AppError> {
    let Some(value) = value else {
        return Ok(None);
    };
    if file_size == 0 {
        return Err(AppError::RangeNotSatisfiable(file_size));
    }
    let value = value
        .to_str()
        .map_err(|_| AppError::BadRequest("invalid Range header".into()))?;
    let Some(range) = value.strip_prefix("bytes=") else {
        return Err(AppError::BadRequest("invalid Range header".into()));
    };
    if range.contains(',') {
        return Err(AppError::BadRequest("multiple ranges not supported".into()));
    }

    let mut parts = range.splitn(2, '-');
    let start_part = parts.next().unwrap_or_default();
    let end_part = parts.next().unwrap_or_default();

    let (start, end) = if start_part.is_empty() {
        let suffix: u64 = end_part
            .parse()
            .map_err(|_| AppError::BadRequest("invalid Range header".into()))?;
        if suffix == 0 {
            return Ok(None);
        }
        let start = file_size.saturating_sub(suffix);
        (start, file_size.saturating_sub(1))
    } else {
        let start: u64 = start_part
            .parse()
            .map_err(|_| AppError::BadRequest("invalid Range header".into()))?;
        let end: u64 = if end_part.is_empty() {
            file_size.saturating_sub(1)
        } else {
            end_part
                .parse()
                .map_err(|_| AppError::BadRequest("invalid Range header".into()))?
        };
        (start, end.min(file_size.saturating_sub(1)))
    };

    if start > end || start >= file_size {
        return Err(AppError::RangeNotSatisfiable(file_size));
    }

    Ok(Some((start, end)))
}
