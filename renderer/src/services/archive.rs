//! Tar streaming of a workshop tree
//!
//! The archive is produced while the tree is walked: a tar builder writes
//! into one end of an in-memory pipe and the HTTP body reads the other. A
//! walk failure after the first bytes have gone out ends the body with an
//! error so the client sees a truncated transfer instead of a short archive.

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;

use crate::error::{RendererError, RendererResult};
use shared::{process_debug, process_error, ProcessId};

const PIPE_CAPACITY: usize = 64 * 1024;
const EXCLUDED_NAME: &str = ".git";

/// Write the tree under `root` as a tar archive into `writer`
///
/// Entries are named relative to `root`, sorted by name, with each directory
/// ahead of its contents. A top-level `.git` and everything below it is
/// skipped; symlinks are stored as links.
///
/// After a walk failure nothing more reaches `writer`, not even the
/// end-of-archive marker.
pub async fn write_archive<W>(root: &Path, writer: W) -> RendererResult<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let gate = GatedWriter::new(writer);
    let open = gate.handle();
    let mut builder = tokio_tar::Builder::new(gate);
    builder.follow_symlinks(false);

    if let Err(e) = append_tree(&mut builder, root).await {
        open.store(false, Ordering::SeqCst);
        drop(builder);
        return Err(e);
    }

    let mut writer = builder
        .into_inner()
        .await
        .map_err(|e| RendererError::archive(e.to_string()))?
        .into_inner();
    writer.flush().await?;
    Ok(writer)
}

async fn append_tree<W>(builder: &mut tokio_tar::Builder<W>, root: &Path) -> RendererResult<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut pending = sorted_children(root, Path::new("")).await?;
    pending.reverse();

    while let Some(relative) = pending.pop() {
        let absolute = root.join(&relative);
        let metadata = tokio::fs::symlink_metadata(&absolute)
            .await
            .map_err(|e| RendererError::archive(format!("{}: {e}", absolute.display())))?;

        if metadata.is_dir() {
            builder
                .append_dir(&relative, &absolute)
                .await
                .map_err(|e| RendererError::archive(format!("{}: {e}", absolute.display())))?;

            let mut children = sorted_children(root, &relative).await?;
            children.reverse();
            pending.extend(children);
        } else {
            builder
                .append_path_with_name(&absolute, &relative)
                .await
                .map_err(|e| RendererError::archive(format!("{}: {e}", absolute.display())))?;
        }
    }

    Ok(())
}

/// Writer that refuses all further output once its handle is cleared
struct GatedWriter<W> {
    inner: W,
    open: Arc<AtomicBool>,
}

impl<W> GatedWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    fn handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.open)
    }

    fn into_inner(self) -> W {
        self.inner
    }

    fn check_open(&self) -> io::Result<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "archive aborted"))
        }
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for GatedWriter<W> {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.check_open()?;
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.check_open()?;
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

async fn sorted_children(root: &Path, relative: &Path) -> RendererResult<Vec<PathBuf>> {
    let dir = root.join(relative);
    let mut entries = tokio::fs::read_dir(&dir)
        .await
        .map_err(|e| RendererError::archive(format!("{}: {e}", dir.display())))?;

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| RendererError::archive(format!("{}: {e}", dir.display())))?
    {
        let name = entry.file_name();
        if relative.as_os_str().is_empty() && name == EXCLUDED_NAME {
            continue;
        }
        names.push(name);
    }

    names.sort();
    Ok(names.into_iter().map(|name| relative.join(name)).collect())
}

/// Stream the tree under `root` as tar bytes
///
/// The walk runs on its own task; the returned stream yields archive chunks
/// as they are produced and finishes with an error if the walk failed.
pub fn stream_archive(root: PathBuf) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
    let (outcome_tx, outcome_rx) = oneshot::channel::<Result<(), String>>();

    tokio::spawn(async move {
        let outcome = match write_archive(&root, writer).await {
            Ok(mut writer) => {
                let _ = writer.shutdown().await;
                process_debug!(ProcessId::current(), "📦 Streamed archive of {}", root.display());
                Ok(())
            }
            Err(e) => {
                process_error!(ProcessId::current(), "❌ Archive of {} aborted: {}", root.display(), e);
                Err(e.to_string())
            }
        };
        let _ = outcome_tx.send(outcome);
    });

    let trailer = stream::once(async move {
        match outcome_rx.await {
            Ok(Ok(())) => None,
            Ok(Err(message)) => Some(Err(io::Error::other(message))),
            Err(_) => Some(Err(io::Error::other("archive task ended unexpectedly"))),
        }
    })
    .filter_map(|item| async move { item });

    ReaderStream::new(reader).chain(trailer)
}
