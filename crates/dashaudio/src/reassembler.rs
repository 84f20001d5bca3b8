// Reassembly of downloaded segments into a single fragmented MP4 file.

use std::path::{Path, PathBuf};

use mpd::SegmentSequence;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::error::ReassemblyError;
use crate::fetcher::FetchResult;

const WRITE_BUFFER_SIZE: usize = 256 * 1024;

/// Concatenate the init segment followed by every successfully fetched media
/// segment, ordered by sequence number, into `output`, then delete the
/// segment files.
///
/// Segment bytes are copied verbatim. Failed media results are skipped; a
/// failed init result is an error. On failure the partial output file is
/// removed and the segment files are left for the caller.
pub async fn reassemble(
    init: &FetchResult,
    media: &[FetchResult],
    output: &Path,
) -> Result<PathBuf, ReassemblyError> {
    if let Err(e) = &init.outcome {
        return Err(ReassemblyError::InitSegmentMissing {
            reason: e.to_string(),
        });
    }

    let mut ordered: Vec<&FetchResult> = media.iter().filter(|r| r.is_success()).collect();
    ordered.sort_by(|a, b| {
        a.sequence
            .cmp(&b.sequence)
            .then_with(|| a.local_path.cmp(&b.local_path))
    });
    if let Some(pair) = ordered
        .windows(2)
        .find(|pair| pair[0].sequence == pair[1].sequence)
    {
        return Err(ReassemblyError::AmbiguousOrder {
            sequence: pair[0].sequence,
            first: pair[0].local_path.clone(),
            second: pair[1].local_path.clone(),
        });
    }
    if ordered.iter().any(|r| r.sequence == SegmentSequence::Init) {
        warn!("Media results contain an init entry, it will be written twice");
    }

    info!(
        segments = ordered.len(),
        output = %output.display(),
        "Reassembling segments"
    );

    match write_all(init, &ordered, output).await {
        Ok(total) => {
            info!(bytes = total, output = %output.display(), "Reassembly complete");
            let intermediates =
                std::iter::once(init).chain(media).map(|r| r.local_path.as_path());
            remove_files(intermediates).await;
            Ok(output.to_path_buf())
        }
        Err(e) => {
            if let Err(remove_err) = tokio::fs::remove_file(output).await
                && remove_err.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %output.display(), error = %remove_err, "Failed to remove partial output");
            }
            Err(e)
        }
    }
}

async fn write_all(
    init: &FetchResult,
    ordered: &[&FetchResult],
    output: &Path,
) -> Result<u64, ReassemblyError> {
    let file = File::create(output)
        .await
        .map_err(|e| ReassemblyError::io(output, e))?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);

    let mut total = 0u64;
    for part in std::iter::once(init).chain(ordered.iter().copied()) {
        let mut source = File::open(&part.local_path)
            .await
            .map_err(|e| ReassemblyError::io(&part.local_path, e))?;
        let copied = tokio::io::copy(&mut source, &mut writer)
            .await
            .map_err(|e| ReassemblyError::io(&part.local_path, e))?;
        debug!(seq = %part.sequence, bytes = copied, "Appended segment");
        total += copied;
    }

    writer
        .flush()
        .await
        .map_err(|e| ReassemblyError::io(output, e))?;
    Ok(total)
}

/// Best-effort removal of transient files. Missing files are ignored and
/// other errors are logged. Returns the number of files removed.
pub async fn remove_files<'a, I>(paths: I) -> usize
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut removed = 0;
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove file"),
        }
    }
    if removed > 0 {
        debug!(removed, "Removed transient files");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SegmentError;
    use reqwest::StatusCode;
    use tempfile::TempDir;

    async fn stored(dir: &Path, sequence: SegmentSequence, bytes: &[u8]) -> FetchResult {
        let path = dir.join(format!("seg_{sequence}.m4s"));
        tokio::fs::write(&path, bytes).await.unwrap();
        FetchResult {
            sequence,
            local_path: path,
            outcome: Ok(bytes.len() as u64),
        }
    }

    #[tokio::test]
    async fn test_orders_by_sequence_number() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        let init = stored(dir, SegmentSequence::Init, b"INIT").await;
        let media = vec![
            stored(dir, SegmentSequence::Media(3), b"-three").await,
            stored(dir, SegmentSequence::Media(1), b"-one").await,
            stored(dir, SegmentSequence::Media(2), b"-two").await,
        ];
        let output = dir.join("master.mp4");

        let expected_len: u64 = std::iter::once(&init)
            .chain(&media)
            .filter_map(FetchResult::bytes)
            .sum();

        let path = reassemble(&init, &media, &output).await.unwrap();

        assert_eq!(path, output);
        let content = tokio::fs::read(&output).await.unwrap();
        assert_eq!(content, b"INIT-one-two-three");
        assert_eq!(content.len() as u64, expected_len);
        for part in std::iter::once(&init).chain(&media) {
            assert!(!part.local_path.exists(), "{}", part.local_path.display());
        }
    }

    #[tokio::test]
    async fn test_numeric_not_lexicographic_order() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        let init = stored(dir, SegmentSequence::Init, b"I").await;
        let media = vec![
            stored(dir, SegmentSequence::Media(10), b"c").await,
            stored(dir, SegmentSequence::Media(9), b"b").await,
            stored(dir, SegmentSequence::Media(1), b"a").await,
        ];
        let output = dir.join("master.mp4");

        reassemble(&init, &media, &output).await.unwrap();
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"Iabc");
    }

    #[tokio::test]
    async fn test_skips_failed_media() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        let init = stored(dir, SegmentSequence::Init, b"I").await;
        let media = vec![
            stored(dir, SegmentSequence::Media(1), b"a").await,
            FetchResult {
                sequence: SegmentSequence::Media(2),
                local_path: dir.join("never_written.m4s"),
                outcome: Err(SegmentError::http_status(StatusCode::NOT_FOUND, "u")),
            },
        ];
        let output = dir.join("master.mp4");

        reassemble(&init, &media, &output).await.unwrap();
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"Ia");
    }

    #[tokio::test]
    async fn test_failed_init_is_rejected() {
        let temp = TempDir::new().unwrap();
        let init = FetchResult {
            sequence: SegmentSequence::Init,
            local_path: temp.path().join("init.mp4"),
            outcome: Err(SegmentError::http_status(StatusCode::FORBIDDEN, "u")),
        };
        let output = temp.path().join("master.mp4");

        let err = reassemble(&init, &[], &output).await.unwrap_err();
        assert!(matches!(err, ReassemblyError::InitSegmentMissing { .. }));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_duplicate_sequence_is_ambiguous() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        let init = stored(dir, SegmentSequence::Init, b"I").await;
        let mut duplicate = stored(dir, SegmentSequence::Media(2), b"x").await;
        duplicate.local_path = dir.join("other.m4s");
        let media = vec![stored(dir, SegmentSequence::Media(2), b"y").await, duplicate];

        let err = reassemble(&init, &media, &dir.join("master.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReassemblyError::AmbiguousOrder {
                sequence: SegmentSequence::Media(2),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_segment_file_removes_partial_output() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        let init = stored(dir, SegmentSequence::Init, b"I").await;
        let media = vec![FetchResult {
            sequence: SegmentSequence::Media(1),
            local_path: dir.join("vanished.m4s"),
            outcome: Ok(4),
        }];
        let output = dir.join("master.mp4");

        let err = reassemble(&init, &media, &output).await.unwrap_err();
        assert!(matches!(err, ReassemblyError::Io { .. }));
        assert!(!output.exists());
        // segments stay in place for the caller to clean up
        assert!(init.local_path.exists());
    }

    #[tokio::test]
    async fn test_remove_files_ignores_missing() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("a.m4s");
        tokio::fs::write(&present, b"a").await.unwrap();
        let missing = temp.path().join("b.m4s");

        let removed = remove_files([present.as_path(), missing.as_path()]).await;
        assert_eq!(removed, 1);
        assert!(!present.exists());

        // second pass is a no-op
        assert_eq!(remove_files([present.as_path()]).await, 0);
    }
}
