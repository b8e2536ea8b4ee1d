pub mod download;

pub use download::{DownloadError, Downloader, HttpDownloader};
