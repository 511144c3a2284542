//! Byte sources: local files, HTTP bodies and S3 objects with optional decompression.
//!
//! Uses async reqwest / async-compression internally with tokio::time::timeout
//! for stall detection, but presents a blocking `BufRead` to the decoders.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::LazyLock;
use std::task::Context;
use std::time::Duration;

use async_compression::tokio::bufread::BzDecoder;
use flate2::read::MultiGzDecoder;
use futures_util::StreamExt;
use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};

/// Read timeout for stall detection (30 seconds with no data = stall)
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffer size for the decoded byte stream (256KB)
const STREAM_BUF_SIZE: usize = 256 * 1024;

/// Error types for stream operations
#[derive(Debug)]
pub enum StreamError {
    /// HTTP error with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    /// I/O error
    Io(io::Error),
    /// URL scheme this source cannot read (e.g. `gs://`)
    UnsupportedScheme(String),
    /// URL with a known scheme but an unusable shape
    InvalidUrl(String),
    /// Archive could not be opened or holds no entry
    Archive(String),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
            Self::UnsupportedScheme(scheme) => write!(f, "unsupported URL scheme: {scheme}"),
            Self::InvalidUrl(msg) => write!(f, "invalid URL: {msg}"),
            Self::Archive(msg) => write!(f, "archive error: {msg}"),
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl StreamError {
    /// Create HTTP error from reqwest error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    /// Create HTTP error from an S3 SDK error, keeping the response status
    fn from_s3<E>(e: &aws_sdk_s3::error::SdkError<E>) -> Self
    where
        E: std::error::Error + 'static,
    {
        use aws_sdk_s3::error::SdkError;

        let status = match e {
            SdkError::ServiceError(service_err) => Some(service_err.raw().status().as_u16()),
            _ => None,
        };
        Self::Http {
            status,
            message: aws_sdk_s3::error::DisplayErrorContext(e).to_string(),
        }
    }
}

impl From<io::Error> for StreamError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<zip::result::ZipError> for StreamError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(e) => Self::Io(e),
            other => Self::Archive(other.to_string()),
        }
    }
}

/// Compression codec wrapped around a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Bz2,
    /// Zip archive; only the first entry is read
    Zip,
}

impl Compression {
    /// Parse codec from its configured name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" | "" => Some(Self::None),
            "gzip" | "gz" => Some(Self::Gzip),
            "bz2" | "bzip2" => Some(Self::Bz2),
            "zip" => Some(Self::Zip),
            _ => None,
        }
    }

    /// Infer codec from the final URL suffix (`.gz`, `.bz2`, `.zip`)
    pub fn infer(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let ext = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "gz" | "gzip" => Self::Gzip,
            "bz2" => Self::Bz2,
            "zip" => Self::Zip,
            _ => Self::None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Bz2 => "bz2",
            Self::Zip => "zip",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(16)
        .build()
        .expect("failed to build HTTP client")
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// S3 client built from the default AWS credential chain on first use.
static S3_CLIENT: tokio::sync::OnceCell<aws_sdk_s3::Client> = tokio::sync::OnceCell::const_new();

async fn s3_client() -> &'static aws_sdk_s3::Client {
    S3_CLIENT
        .get_or_init(|| async {
            let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            aws_sdk_s3::Client::new(&sdk_config)
        })
        .await
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Decoded, buffered byte stream handed to a record decoder
pub type ByteStream = Box<dyn BufRead + Send>;

type AsyncBody = Pin<Box<dyn AsyncBufRead + Send>>;

/// Where a URL points to
#[derive(Debug, PartialEq, Eq)]
enum Location<'a> {
    Local(PathBuf),
    Remote(&'a str),
    S3 { bucket: &'a str, key: &'a str },
}

fn locate(url: &str) -> Result<Location<'_>, StreamError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(Location::Remote(url));
    }
    if let Some(object) = url.strip_prefix("s3://") {
        return match object.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
                Ok(Location::S3 { bucket, key })
            }
            _ => Err(StreamError::InvalidUrl(format!(
                "{url}: expected s3://bucket/key"
            ))),
        };
    }
    if let Some(path) = url.strip_prefix("file://") {
        return Ok(Location::Local(PathBuf::from(path)));
    }
    if let Some((scheme, _)) = url.split_once("://") {
        return Err(StreamError::UnsupportedScheme(scheme.to_string()));
    }
    Ok(Location::Local(PathBuf::from(url)))
}

/// Filesystem path behind a plain path or `file://` URL; `None` for remote URLs.
pub fn local_path(url: &str) -> Option<PathBuf> {
    match locate(url) {
        Ok(Location::Local(path)) => Some(path),
        _ => None,
    }
}

/// Open `url` and undo `compression`, returning a buffered reader over the payload.
///
/// Nothing is read past what the caller consumes, except for zip archives:
/// those are spooled to anonymous temp files (never to memory) because the
/// central directory sits at the end of the archive.
pub fn open(url: &str, compression: Compression) -> Result<ByteStream, StreamError> {
    let location = locate(url)?;
    log::debug!("{url}: opening ({compression})");

    let stream: ByteStream = match compression {
        Compression::None => Box::new(BufReader::with_capacity(
            STREAM_BUF_SIZE,
            open_raw(location)?,
        )),
        Compression::Gzip => Box::new(BufReader::with_capacity(
            STREAM_BUF_SIZE,
            MultiGzDecoder::new(open_raw(location)?),
        )),
        Compression::Bz2 => {
            let body = SHARED_RUNTIME.handle().block_on(open_async(location))?;
            Box::new(BufReader::with_capacity(
                STREAM_BUF_SIZE,
                TimeoutReader::new(BzDecoder::new(body)),
            ))
        }
        Compression::Zip => open_zip_entry(url, location)?,
    };
    Ok(stream)
}

fn open_raw(location: Location<'_>) -> Result<Box<dyn Read + Send>, StreamError> {
    match location {
        Location::Local(path) => Ok(Box::new(File::open(path)?)),
        Location::Remote(url) => {
            let body = SHARED_RUNTIME.handle().block_on(request_body(url))?;
            Ok(Box::new(TimeoutReader::new(body)))
        }
        Location::S3 { bucket, key } => {
            let body = SHARED_RUNTIME.handle().block_on(object_body(bucket, key))?;
            Ok(Box::new(TimeoutReader::new(body)))
        }
    }
}

async fn open_async(location: Location<'_>) -> Result<AsyncBody, StreamError> {
    match location {
        Location::Local(path) => {
            let file = tokio::fs::File::open(path).await?;
            Ok(Box::pin(tokio::io::BufReader::new(file)))
        }
        Location::Remote(url) => request_body(url).await,
        Location::S3 { bucket, key } => object_body(bucket, key).await,
    }
}

/// HTTP GET → response body as an async buffered reader
async fn request_body(url: &str) -> Result<AsyncBody, StreamError> {
    let response = SHARED_CLIENT
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| StreamError::from_reqwest(&e))?;

    let stream = response
        .bytes_stream()
        .map(|result| result.map_err(io::Error::other));
    Ok(Box::pin(tokio_util::io::StreamReader::new(stream)))
}

/// S3 GET → object body as an async buffered reader
async fn object_body(bucket: &str, key: &str) -> Result<AsyncBody, StreamError> {
    let response = s3_client()
        .await
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| StreamError::from_s3(&e))?;

    Ok(Box::pin(response.body.into_async_read()))
}

fn open_zip_entry(url: &str, location: Location<'_>) -> Result<ByteStream, StreamError> {
    let archive_file = match location {
        Location::Local(path) => File::open(path)?,
        remote => {
            let mut spool = tempfile::tempfile()?;
            io::copy(&mut open_raw(remote)?, &mut spool)?;
            spool.seek(SeekFrom::Start(0))?;
            spool
        }
    };

    let mut archive = zip::ZipArchive::new(archive_file)?;
    if archive.len() == 0 {
        return Err(StreamError::Archive(format!("{url}: archive has no entries")));
    }
    if archive.len() > 1 {
        log::warn!(
            "{url}: archive holds {} entries, reading only the first",
            archive.len()
        );
    }

    let mut extracted = tempfile::tempfile()?;
    {
        let mut entry = archive.by_index(0)?;
        log::debug!("{url}: extracting zip entry {}", entry.name());
        io::copy(&mut entry, &mut extracted)?;
    }
    extracted.seek(SeekFrom::Start(0))?;
    Ok(Box::new(BufReader::with_capacity(STREAM_BUF_SIZE, extracted)))
}

/// Async-to-sync bridge with read timeout.
///
/// Each read operation has a timeout - if no data arrives within
/// READ_TIMEOUT, returns a TimedOut error.
pub struct TimeoutReader<R> {
    inner: R,
}

impl<R> TimeoutReader<R> {
    fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: AsyncRead + Unpin> Read for TimeoutReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        SHARED_RUNTIME.handle().block_on(async {
            let read_future = async {
                let mut read_buf = ReadBuf::new(buf);
                std::future::poll_fn(|cx: &mut Context<'_>| {
                    Pin::new(&mut self.inner).poll_read(cx, &mut read_buf)
                })
                .await?;
                Ok::<_, io::Error>(read_buf.filled().len())
            };

            match tokio::time::timeout(READ_TIMEOUT, read_future).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "read timeout (30s with no data)",
                )),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PAYLOAD: &str = "id,name\n1,alpha\n2,beta\n";

    fn read_all(mut stream: ByteStream) -> String {
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn compression_from_name() {
        assert_eq!(Compression::from_name("none"), Some(Compression::None));
        assert_eq!(Compression::from_name("GZIP"), Some(Compression::Gzip));
        assert_eq!(Compression::from_name("bz2"), Some(Compression::Bz2));
        assert_eq!(Compression::from_name("zip"), Some(Compression::Zip));
        assert_eq!(Compression::from_name("lzma"), None);
    }

    #[test]
    fn compression_inferred_from_suffix() {
        assert_eq!(Compression::infer("data/a.csv.gz"), Compression::Gzip);
        assert_eq!(Compression::infer("https://x.org/a.json.bz2"), Compression::Bz2);
        assert_eq!(Compression::infer("a.ttl.zip?sig=1"), Compression::Zip);
        assert_eq!(Compression::infer("a.csv"), Compression::None);
        assert_eq!(Compression::infer("noext"), Compression::None);
    }

    #[test]
    fn locate_schemes() {
        assert_eq!(
            locate("https://x.org/a.csv").unwrap(),
            Location::Remote("https://x.org/a.csv")
        );
        assert_eq!(
            locate("file:///tmp/a.csv").unwrap(),
            Location::Local(PathBuf::from("/tmp/a.csv"))
        );
        assert_eq!(
            locate("/tmp/a.csv").unwrap(),
            Location::Local(PathBuf::from("/tmp/a.csv"))
        );
        assert_eq!(
            locate("s3://bucket/dumps/a.csv.gz").unwrap(),
            Location::S3 {
                bucket: "bucket",
                key: "dumps/a.csv.gz"
            }
        );
        assert!(matches!(
            locate("s3://bucket"),
            Err(StreamError::InvalidUrl(_))
        ));
        assert!(matches!(
            locate("s3:///a.csv"),
            Err(StreamError::InvalidUrl(_))
        ));
        assert!(matches!(
            locate("gs://bucket/a.csv"),
            Err(StreamError::UnsupportedScheme(s)) if s == "gs"
        ));
    }

    #[test]
    fn local_path_only_for_filesystem_urls() {
        assert_eq!(local_path("file:///tmp/a.csv"), Some(PathBuf::from("/tmp/a.csv")));
        assert_eq!(local_path("data/a.csv"), Some(PathBuf::from("data/a.csv")));
        assert_eq!(local_path("https://x.org/a.csv"), None);
        assert_eq!(local_path("s3://bucket/a.csv"), None);
    }

    #[test]
    fn open_plain_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PAYLOAD.as_bytes()).unwrap();
        let stream = open(file.path().to_str().unwrap(), Compression::None).unwrap();
        assert_eq!(read_all(stream), PAYLOAD);
    }

    #[test]
    fn open_missing_file_is_io_error() {
        let err = match open("/nonexistent/graphingest/a.csv", Compression::None) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, StreamError::Io(_)));
    }

    #[test]
    fn open_gzip_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        enc.write_all(PAYLOAD.as_bytes()).unwrap();
        file.write_all(&enc.finish().unwrap()).unwrap();

        let url = format!("file://{}", file.path().display());
        assert_eq!(read_all(open(&url, Compression::Gzip).unwrap()), PAYLOAD);
    }

    #[test]
    fn open_bz2_file() {
        use tokio::io::AsyncReadExt;

        let compressed = SHARED_RUNTIME.block_on(async {
            let mut enc = async_compression::tokio::bufread::BzEncoder::new(PAYLOAD.as_bytes());
            let mut out = Vec::new();
            enc.read_to_end(&mut out).await.unwrap();
            out
        });
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&compressed).unwrap();

        let stream = open(file.path().to_str().unwrap(), Compression::Bz2).unwrap();
        assert_eq!(read_all(stream), PAYLOAD);
    }

    #[test]
    fn open_zip_reads_first_entry() {
        let file = tempfile::NamedTempFile::new().unwrap();
        {
            let mut writer = zip::ZipWriter::new(file.reopen().unwrap());
            let options = zip::write::FileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            writer.start_file("first.csv", options).unwrap();
            writer.write_all(PAYLOAD.as_bytes()).unwrap();
            writer.start_file("second.csv", options).unwrap();
            writer.write_all(b"ignored\n").unwrap();
            writer.finish().unwrap();
        }
        let stream = open(file.path().to_str().unwrap(), Compression::Zip).unwrap();
        assert_eq!(read_all(stream), PAYLOAD);
    }

    #[test]
    fn open_empty_zip_is_archive_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        zip::ZipWriter::new(file.reopen().unwrap()).finish().unwrap();
        let err = match open(file.path().to_str().unwrap(), Compression::Zip) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, StreamError::Archive(_)));
    }

    #[test]
    fn display_http_with_status() {
        let err = StreamError::Http {
            status: Some(404),
            message: "test".to_string(),
        };
        assert_eq!(format!("{err}"), "HTTP 404: test");
    }

    #[test]
    fn display_unsupported_scheme() {
        let err = StreamError::UnsupportedScheme("s3".into());
        assert_eq!(format!("{err}"), "unsupported URL scheme: s3");
    }
}
