//! MJPEG over `multipart/x-mixed-replace`.
//!
//! One processed frame is shared between the capture thread and every HTTP
//! client. Each client gets its own producer task that JPEG-encodes
//! whatever frame is current and pushes it down the response body, until
//! the client leaves or [`SharedFrame::close`] is called.

use crate::{Error, Result};
use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use opencv::core::{Mat, Vector};
use opencv::imgcodecs;
use opencv::prelude::*;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

pub const BOUNDARY: &str = "frame";

/// How long a client waits before checking again when no frame exists yet.
const EMPTY_FRAME_WAIT: Duration = Duration::from_millis(100);
const CLIENT_QUEUE_DEPTH: usize = 1;

type Part = std::result::Result<Bytes, Infallible>;

/// The single most recent processed frame.
#[derive(Clone)]
pub struct SharedFrame {
    inner: Arc<Mutex<Option<Mat>>>,
    closing: Arc<watch::Sender<bool>>,
}

impl SharedFrame {
    pub fn new() -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            inner: Arc::new(Mutex::new(None)),
            closing: Arc::new(closing),
        }
    }

    /// Replaces the current frame with a copy of `frame`.
    pub fn publish(&self, frame: &Mat) -> Result<()> {
        let copy = frame.try_clone()?;
        let mut guard = self.inner.lock().map_err(|_| Error::LockPoisoned)?;
        *guard = Some(copy);
        Ok(())
    }

    pub fn is_empty(&self) -> Result<bool> {
        let guard = self.inner.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(guard.is_none())
    }

    /// JPEG bytes of the current frame, `None` until the first publish.
    pub fn encode_latest(&self) -> Result<Option<Bytes>> {
        let guard = self.inner.lock().map_err(|_| Error::LockPoisoned)?;
        match guard.as_ref() {
            None => Ok(None),
            Some(frame) => encode_jpeg(frame).map(Some),
        }
    }

    /// Ends every open MJPEG stream and refuses to feed new ones.
    pub fn close(&self) {
        self.closing.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closing.borrow()
    }
}

impl Default for SharedFrame {
    fn default() -> Self {
        Self::new()
    }
}

pub fn content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={BOUNDARY}")
}

pub fn encode_jpeg(frame: &Mat) -> Result<Bytes> {
    let mut buffer: Vector<u8> = Vector::new();
    if !imgcodecs::imencode_def(".jpg", frame, &mut buffer)? {
        return Err(Error::EncodeFailed);
    }
    Ok(Bytes::from(buffer.to_vec()))
}

/// One multipart section: boundary, part header, JPEG payload.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!("--{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// Streams `shared` to one client until it disconnects or the frame is closed.
pub fn mjpeg_response(shared: SharedFrame) -> Response {
    let (parts, _feeder) = spawn_feed(shared);
    (
        [
            (header::CONTENT_TYPE, content_type()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(parts),
    )
        .into_response()
}

fn spawn_feed(shared: SharedFrame) -> (ReceiverStream<Part>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(CLIENT_QUEUE_DEPTH);
    let feeder = tokio::spawn(feed_client(shared, tx));
    (ReceiverStream::new(rx), feeder)
}

async fn feed_client(shared: SharedFrame, tx: mpsc::Sender<Part>) {
    let mut closing = shared.closing.subscribe();
    tracing::debug!("MJPEG client connected");
    while !*closing.borrow_and_update() {
        let latest = {
            let shared = shared.clone();
            tokio::task::spawn_blocking(move || shared.encode_latest()).await
        };
        match latest {
            Ok(Ok(Some(jpeg))) => tokio::select! {
                sent = tx.send(Ok(multipart_part(&jpeg))) => {
                    if sent.is_err() {
                        break;
                    }
                }
                _ = closing.changed() => break,
            },
            Ok(Ok(None)) => tokio::select! {
                _ = tokio::time::sleep(EMPTY_FRAME_WAIT) => {}
                _ = tx.closed() => break,
                _ = closing.changed() => break,
            },
            Ok(Err(Error::LockPoisoned)) => {
                tracing::error!("Shared frame lock poisoned, closing MJPEG stream");
                break;
            }
            Ok(Err(e)) => {
                if tx.is_closed() {
                    break;
                }
                tracing::warn!("Skipping frame: {e}");
            }
            Err(e) => {
                tracing::error!("Frame encoder task failed: {e}");
                break;
            }
        }
    }
    tracing::debug!("MJPEG client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;
    use tokio_stream::StreamExt;

    #[test]
    fn part_layout() {
        let part = multipart_part(b"JPEG");
        assert_eq!(
            &part[..],
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n".as_slice()
        );
    }

    #[test]
    fn nothing_to_encode_before_first_publish() {
        let shared = SharedFrame::new();
        assert!(shared.is_empty().unwrap());
        assert!(shared.encode_latest().unwrap().is_none());
    }

    #[test]
    fn published_frame_encodes_to_jpeg() {
        let shared = SharedFrame::new();
        shared.publish(&crate::blank_frame(64, 48)).unwrap();
        let jpeg = shared.encode_latest().unwrap().unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn publish_keeps_only_the_latest_frame() {
        let shared = SharedFrame::new();
        shared.publish(&crate::blank_frame(64, 48)).unwrap();
        shared.publish(&crate::blank_frame(32, 16)).unwrap();
        let jpeg = shared.encode_latest().unwrap().unwrap();
        let decoded = imgcodecs::imdecode(
            &Vector::<u8>::from_slice(&jpeg),
            imgcodecs::IMREAD_COLOR,
        )
        .unwrap();
        assert_eq!((decoded.cols(), decoded.rows()), (32, 16));
    }

    #[tokio::test]
    async fn response_is_multipart() {
        let response = mjpeg_response(SharedFrame::new());
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "multipart/x-mixed-replace; boundary=frame"
        );
    }

    #[tokio::test]
    async fn body_yields_jpeg_parts() {
        let shared = SharedFrame::new();
        shared.publish(&crate::blank_frame(64, 48)).unwrap();
        let response = mjpeg_response(shared);
        let mut body = response.into_body().into_data_stream();

        let part = timeout(Duration::from_secs(5), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let header = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
        assert!(part.starts_with(header));
        assert_eq!(&part[header.len()..header.len() + 2], &[0xFF, 0xD8]);
        assert!(part.ends_with(b"\r\n"));
    }

    #[tokio::test]
    async fn waits_for_the_first_frame() {
        let shared = SharedFrame::new();
        let (mut parts, _feeder) = spawn_feed(shared.clone());

        assert!(timeout(EMPTY_FRAME_WAIT * 3, parts.next()).await.is_err());

        shared.publish(&crate::blank_frame(32, 16)).unwrap();
        let part = timeout(Duration::from_secs(5), parts.next()).await.unwrap();
        assert!(part.is_some());
    }

    #[tokio::test]
    async fn feeder_stops_when_client_goes_away() {
        let shared = SharedFrame::new();
        shared.publish(&crate::blank_frame(32, 16)).unwrap();
        let (mut parts, feeder) = spawn_feed(shared);
        assert!(timeout(Duration::from_secs(5), parts.next()).await.unwrap().is_some());

        drop(parts);
        timeout(Duration::from_secs(5), feeder).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn feeder_stops_when_no_frame_ever_arrives_and_client_leaves() {
        let (parts, feeder) = spawn_feed(SharedFrame::new());
        drop(parts);
        timeout(Duration::from_secs(5), feeder).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn close_ends_open_streams() {
        let shared = SharedFrame::new();
        shared.publish(&crate::blank_frame(32, 16)).unwrap();
        let (mut parts, feeder) = spawn_feed(shared.clone());
        assert!(timeout(Duration::from_secs(5), parts.next()).await.unwrap().is_some());

        shared.close();
        assert!(shared.is_closed());
        timeout(Duration::from_secs(5), feeder).await.unwrap().unwrap();
        // at most one part was already queued before the close
        let mut remaining = 0;
        while let Some(_part) = timeout(Duration::from_secs(5), parts.next()).await.unwrap() {
            remaining += 1;
        }
        assert!(remaining <= CLIENT_QUEUE_DEPTH);
    }
}
