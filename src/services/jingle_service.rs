//! Chunked binary streaming of jingle audio files to individual buzzers.
//!
//! Each chunk is a binary WebSocket frame: an 8-byte little-endian header
//! `[u32 jingleId][u32 chunkIndex]` followed by up to [`CHUNK_SIZE`] bytes of
//! audio. Streams are serialized per buzzer through the active-stream set;
//! chunks ride the buzzer's writer channel, so ordering is the channel's.

use std::path::{Component, Path, PathBuf};

use tokio::{fs::File, io::AsyncReadExt};
use tracing::{info, warn};

use crate::{
    dao::models::JingleEntity,
    dto::ws::{JinglePlayPayload, ServerMessage},
    services::broadcaster,
    state::SharedState,
};

/// Payload bytes per binary frame.
pub const CHUNK_SIZE: usize = 4096;

/// Build one binary frame: little-endian header, then the audio bytes.
pub fn frame_chunk(jingle_id: u32, chunk_index: u32, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.extend_from_slice(&jingle_id.to_le_bytes());
    frame.extend_from_slice(&chunk_index.to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Resolve a stored jingle path against the configured root, refusing any
/// path that escapes it.
///
/// The walk is lexical: `..` components pop, and popping past the root (or an
/// absolute stored path outside the root) rejects the request. Symlinks under
/// the root are the operator's own choice.
pub fn resolve_within_root(root: &Path, stored: &str) -> Option<PathBuf> {
    let stored_path = Path::new(stored);
    let relative = if stored_path.is_absolute() {
        stored_path.strip_prefix(root).ok()?
    } else {
        stored_path
    };

    let mut depth: usize = 0;
    let mut resolved = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                resolved.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if depth == 0 {
        // The path resolved to the root itself; nothing to stream.
        return None;
    }
    Some(resolved)
}

/// Handle `JINGLE_PLAY`: validate, announce, and spawn the chunk pump.
pub async fn handle_jingle_play(state: &SharedState, payload: JinglePlayPayload) {
    let buzzer_id = payload.buzzer_id;
    let jingle_id = payload.jingle_id;

    if state.jingle_streams().contains(&buzzer_id) {
        send_jingle_error(state, &buzzer_id, jingle_id, "already playing").await;
        return;
    }

    let Some(tx) = state.registry().buzzer_tx(&buzzer_id) else {
        send_jingle_error(state, &buzzer_id, jingle_id, "not connected").await;
        return;
    };
    if tx.is_closed() {
        send_jingle_error(state, &buzzer_id, jingle_id, "not connected").await;
        return;
    }

    let jingle = match state.catalog().find_jingle(jingle_id).await {
        Ok(Some(jingle)) => jingle,
        Ok(None) => {
            send_jingle_error(state, &buzzer_id, jingle_id, "jingle not found").await;
            return;
        }
        Err(err) => {
            warn!(jingle_id, error = %err, "jingle lookup failed");
            send_jingle_error(state, &buzzer_id, jingle_id, "jingle not found").await;
            return;
        }
    };

    let root = state.config().jingle_root.clone();
    let Some(path) = resolve_within_root(&root, &jingle.file_path) else {
        warn!(jingle_id, stored = %jingle.file_path, "jingle path escapes the jingle root");
        send_jingle_error(state, &buzzer_id, jingle_id, "invalid file path").await;
        return;
    };

    let file_size = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata.len(),
        Err(_) => {
            send_jingle_error(state, &buzzer_id, jingle_id, "file not found").await;
            return;
        }
    };

    let format = path
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_default();

    broadcaster::send_to_buzzer(
        state,
        &buzzer_id,
        &ServerMessage::JingleStart {
            jingle_id,
            name: jingle.name.clone(),
            format,
            file_size,
        },
    );
    broadcaster::send_to_console(
        state,
        &ServerMessage::JingleStarted {
            buzzer_id: buzzer_id.clone(),
            jingle_id,
            name: jingle.name.clone(),
            file_size,
        },
    )
    .await;

    if !state.jingle_streams().insert(buzzer_id.clone()) {
        // A concurrent request claimed the buzzer between the check and here.
        send_jingle_error(state, &buzzer_id, jingle_id, "already playing").await;
        return;
    }

    let state = std::sync::Arc::clone(state);
    tokio::spawn(async move {
        let outcome = pump_chunks(&state, &buzzer_id, &jingle, &path, file_size).await;
        state.jingle_streams().remove(&buzzer_id);
        match outcome {
            Ok(Some(total_chunks)) => {
                broadcaster::send_to_buzzer(
                    &state,
                    &buzzer_id,
                    &ServerMessage::JingleEnd {
                        jingle_id,
                        total_chunks,
                        file_size,
                    },
                );
                broadcaster::send_to_console(
                    &state,
                    &ServerMessage::JingleCompleted {
                        buzzer_id: buzzer_id.clone(),
                        jingle_id,
                        total_chunks,
                    },
                )
                .await;
                info!(buzzer_id = %buzzer_id, jingle_id, total_chunks, "jingle stream completed");
            }
            // Aborted mid-stream: no end-of-stream signal for a partial stream.
            Ok(None) => {
                info!(buzzer_id = %buzzer_id, jingle_id, "jingle stream aborted, buzzer gone");
            }
            Err(err) => {
                warn!(buzzer_id = %buzzer_id, jingle_id, error = %err, "jingle stream failed");
                broadcaster::send_to_console(
                    &state,
                    &ServerMessage::JingleError {
                        buzzer_id: Some(buzzer_id.clone()),
                        jingle_id: Some(jingle_id),
                        error: err.to_string(),
                    },
                )
                .await;
            }
        }
    });
}

/// Read the file in fixed-size chunks and push framed packets in order.
///
/// Returns `Ok(Some(chunks))` on a complete stream, `Ok(None)` when the
/// buzzer went away mid-stream (the read is aborted, no end frame is owed).
async fn pump_chunks(
    state: &SharedState,
    buzzer_id: &str,
    jingle: &JingleEntity,
    path: &Path,
    file_size: u64,
) -> std::io::Result<Option<u32>> {
    let mut file = File::open(path).await?;
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut chunk_index: u32 = 0;
    let mut sent: u64 = 0;

    loop {
        let filled = read_chunk(&mut file, &mut buffer).await?;
        if filled == 0 {
            break;
        }

        let writable = state
            .registry()
            .buzzer_tx(buzzer_id)
            .is_some_and(|tx| broadcaster::send_binary_to_tx(&tx, frame_chunk(jingle.id, chunk_index, &buffer[..filled])));
        if !writable {
            return Ok(None);
        }

        sent += filled as u64;
        chunk_index += 1;
    }

    if sent != file_size {
        warn!(
            buzzer_id,
            jingle_id = jingle.id,
            sent,
            file_size,
            "jingle file size changed while streaming"
        );
    }
    Ok(Some(chunk_index))
}

/// Fill `buffer` from the file, tolerating short reads; returns bytes read
/// (less than the buffer length only at end of file).
async fn read_chunk(file: &mut File, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = file.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

async fn send_jingle_error(state: &SharedState, buzzer_id: &str, jingle_id: u32, error: &str) {
    warn!(buzzer_id, jingle_id, error, "jingle request refused");
    broadcaster::send_to_console(
        state,
        &ServerMessage::JingleError {
            buzzer_id: Some(buzzer_id.to_string()),
            jingle_id: Some(jingle_id),
            error: error.to_string(),
        },
    )
    .await;
}
