// Segment planning: turns a parsed manifest into the ordered list of downloads.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::PlanError;
use crate::manifest::Manifest;
use crate::template;

/// Upper bound on the number of media segments a single plan may contain.
pub const MAX_SEGMENTS: u64 = 1_000_000;

/// Position of a segment in the reassembled stream.
///
/// `Init` orders before every `Media` number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SegmentSequence {
    Init,
    Media(u64),
}

impl SegmentSequence {
    pub fn is_init(&self) -> bool {
        matches!(self, Self::Init)
    }

    /// The media segment number, `None` for the init segment.
    pub fn number(&self) -> Option<u64> {
        match self {
            Self::Init => None,
            Self::Media(n) => Some(*n),
        }
    }
}

impl fmt::Display for SegmentSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::Media(n) => write!(f, "{n}"),
        }
    }
}

/// One planned download unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSpec {
    pub sequence: SegmentSequence,
    pub remote_url: String,
    pub local_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SegmentPlan {
    pub init: SegmentSpec,
    /// Media segments in ascending sequence order
    pub media: Vec<SegmentSpec>,
    /// `ceil(total_duration / segment_duration)` as declared by the manifest
    pub expected_segment_count: u64,
}

impl SegmentPlan {
    /// Build the plan for `manifest`, placing every segment file directly
    /// inside `output_dir` with `file_prefix` prepended to its name.
    ///
    /// Media numbers run from `start_number` to `expected_segment_count`
    /// inclusive. Every local path in the plan is unique.
    pub fn build(
        manifest: &Manifest,
        output_dir: &Path,
        file_prefix: &str,
    ) -> Result<Self, PlanError> {
        Self::build_reserving(manifest, output_dir, file_prefix, &[])
    }

    /// Like [`SegmentPlan::build`], but no segment may land on any of the
    /// `reserved` paths.
    pub fn build_reserving(
        manifest: &Manifest,
        output_dir: &Path,
        file_prefix: &str,
        reserved: &[&Path],
    ) -> Result<Self, PlanError> {
        let expected_segment_count = manifest.expected_segment_count();
        if expected_segment_count > MAX_SEGMENTS {
            return Err(PlanError::TooManySegments {
                count: expected_segment_count,
            });
        }

        let init_name = template::expand(
            &manifest.init_template,
            &manifest.representation_id,
            None,
        )?;
        let init = SegmentSpec {
            sequence: SegmentSequence::Init,
            remote_url: format!("{}{}", manifest.base_url, init_name),
            local_path: output_dir.join(local_file_name(file_prefix, &init_name)),
        };

        let mut seen: HashSet<PathBuf> = reserved.iter().map(|p| p.to_path_buf()).collect();
        if !seen.insert(init.local_path.clone()) {
            return Err(PlanError::DuplicatePath {
                path: init.local_path,
            });
        }

        let media = (manifest.start_number..=expected_segment_count)
            .map(|number| {
                let name = template::expand(
                    &manifest.media_template,
                    &manifest.representation_id,
                    Some(number),
                )?;
                let local_path = output_dir.join(local_file_name(file_prefix, &name));
                if !seen.insert(local_path.clone()) {
                    return Err(PlanError::DuplicatePath { path: local_path });
                }
                Ok(SegmentSpec {
                    sequence: SegmentSequence::Media(number),
                    remote_url: format!("{}{}", manifest.base_url, name),
                    local_path,
                })
            })
            .collect::<Result<Vec<_>, PlanError>>()?;

        debug!(
            expected = expected_segment_count,
            planned = media.len(),
            first = manifest.start_number,
            "Planned DASH segments"
        );

        Ok(Self {
            init,
            media,
            expected_segment_count,
        })
    }

    /// Total number of downloads, init segment included.
    pub fn download_count(&self) -> usize {
        self.media.len() + 1
    }

    /// Init segment first, then media segments in order.
    pub fn iter(&self) -> impl Iterator<Item = &SegmentSpec> {
        std::iter::once(&self.init).chain(self.media.iter())
    }
}

/// Flatten a templated segment name into a single file name.
fn local_file_name(prefix: &str, name: &str) -> String {
    let mut result = String::with_capacity(prefix.len() + name.len());
    result.push_str(prefix);
    result.push_str(&sanitize_file_name(name));
    result
}

/// Replace path separators, control characters and characters Windows
/// rejects in file names with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    const INVALID: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
    name.chars()
        .map(|c| if INVALID.contains(&c) || c < ' ' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(total: f64, segment: f64, start: u64) -> Manifest {
        Manifest {
            base_url: "https://cdn.example.com/a/".to_string(),
            representation_id: "0".to_string(),
            init_template: "init_$RepresentationID$.mp4".to_string(),
            media_template: "seg_$RepresentationID$_$Number$.m4s".to_string(),
            start_number: start,
            total_duration_secs: total,
            segment_duration_secs: segment,
        }
    }

    #[test]
    fn test_media_count_matches_ceiling() {
        for (total, segment) in [(10.0, 2.0), (10.5, 2.0), (183.466, 4.0), (1.0, 4.0), (4.0, 4.0)] {
            let m = manifest(total, segment, 1);
            let plan = SegmentPlan::build(&m, Path::new("out"), "p_").unwrap();
            let expected = (total / segment).ceil() as usize;
            assert_eq!(plan.media.len(), expected, "T={total} D={segment}");
            assert_eq!(plan.expected_segment_count as usize, expected);
            assert_eq!(plan.download_count(), expected + 1);
        }
    }

    #[test]
    fn test_zero_start_number_includes_upper_bound() {
        let plan = SegmentPlan::build(&manifest(6.0, 2.0, 0), Path::new("out"), "").unwrap();
        let numbers: Vec<_> = plan.media.iter().filter_map(|s| s.sequence.number()).collect();
        assert_eq!(numbers, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_start_beyond_end_is_empty() {
        let plan = SegmentPlan::build(&manifest(4.0, 2.0, 5), Path::new("out"), "").unwrap();
        assert!(plan.media.is_empty());
        assert_eq!(plan.download_count(), 1);
    }

    #[test]
    fn test_urls_and_local_paths() {
        let plan = SegmentPlan::build(&manifest(4.0, 2.0, 1), Path::new("out"), "pid_").unwrap();
        assert_eq!(plan.init.sequence, SegmentSequence::Init);
        assert_eq!(plan.init.remote_url, "https://cdn.example.com/a/init_0.mp4");
        assert_eq!(plan.init.local_path, Path::new("out").join("pid_init_0.mp4"));

        let first = &plan.media[0];
        assert_eq!(first.sequence, SegmentSequence::Media(1));
        assert_eq!(first.remote_url, "https://cdn.example.com/a/seg_0_1.m4s");
        assert_eq!(first.local_path, Path::new("out").join("pid_seg_0_1.m4s"));

        let order: Vec<_> = plan.iter().map(|s| s.sequence).collect();
        assert_eq!(
            order,
            vec![
                SegmentSequence::Init,
                SegmentSequence::Media(1),
                SegmentSequence::Media(2)
            ]
        );
    }

    #[test]
    fn test_nested_names_are_flattened() {
        let mut m = manifest(2.0, 2.0, 1);
        m.media_template = "chunks/$Number$.m4s?sig=abc".to_string();
        let plan = SegmentPlan::build(&m, Path::new("out"), "").unwrap();
        assert_eq!(plan.media[0].remote_url, "https://cdn.example.com/a/chunks/1.m4s?sig=abc");
        assert_eq!(plan.media[0].local_path, Path::new("out").join("chunks_1.m4s_sig=abc"));
    }

    #[test]
    fn test_duplicate_paths_rejected() {
        let mut m = manifest(6.0, 2.0, 1);
        m.media_template = "static.m4s".to_string();
        assert!(matches!(
            SegmentPlan::build(&m, Path::new("out"), ""),
            Err(PlanError::DuplicatePath { .. })
        ));

        let mut m = manifest(2.0, 2.0, 1);
        m.media_template = "init_$RepresentationID$.mp4".to_string();
        assert!(matches!(
            SegmentPlan::build(&m, Path::new("out"), ""),
            Err(PlanError::DuplicatePath { .. })
        ));
    }

    #[test]
    fn test_reserved_paths_rejected() {
        let master = Path::new("out").join("pid_master_audio.mp4");
        let diagnostic = Path::new("out").join("pid_manifest.mpd");
        let reserved = [master.as_path(), diagnostic.as_path()];

        let mut m = manifest(2.0, 2.0, 1);
        m.media_template = "master_audio.mp4".to_string();
        assert!(matches!(
            SegmentPlan::build_reserving(&m, Path::new("out"), "pid_", &reserved),
            Err(PlanError::DuplicatePath { path }) if path == master
        ));

        let mut m = manifest(2.0, 2.0, 1);
        m.init_template = "manifest.mpd".to_string();
        assert!(matches!(
            SegmentPlan::build_reserving(&m, Path::new("out"), "pid_", &reserved),
            Err(PlanError::DuplicatePath { path }) if path == diagnostic
        ));

        let plan =
            SegmentPlan::build_reserving(&manifest(4.0, 2.0, 1), Path::new("out"), "pid_", &reserved)
                .unwrap();
        assert_eq!(plan.media.len(), 2);
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize_file_name("plain-name_1.m4s"), "plain-name_1.m4s");
        assert_eq!(sanitize_file_name("tab\there"), "tab_here");
    }

    #[test]
    fn test_sequence_ordering() {
        assert!(SegmentSequence::Init < SegmentSequence::Media(0));
        assert!(SegmentSequence::Media(2) < SegmentSequence::Media(10));
        assert_eq!(SegmentSequence::Init.to_string(), "init");
        assert_eq!(SegmentSequence::Media(7).to_string(), "7");
    }

    #[test]
    fn test_too_many_segments() {
        assert!(matches!(
            SegmentPlan::build(&manifest(1e12, 1.0, 1), Path::new("out"), ""),
            Err(PlanError::TooManySegments { .. })
        ));
    }
}
