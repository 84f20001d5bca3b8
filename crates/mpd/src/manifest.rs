//! MPEG-DASH manifest parsing.
//!
//! Only the handful of fields needed to address a single audio
//! representation are extracted. Elements are matched by local name, so both
//! default-namespaced and prefixed documents are accepted. When a document
//! carries several `BaseURL` or `Representation` elements the first one in
//! document order is used and the rest are ignored.

use std::str::FromStr;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, trace};

use crate::duration::parse_seconds;
use crate::error::ManifestError;

const ROOT: &str = "MPD";
const BASE_URL: &[u8] = b"BaseURL";
const REPRESENTATION: &[u8] = b"Representation";
const SEGMENT_TEMPLATE: &[u8] = b"SegmentTemplate";

/// Addressing information for one DASH audio representation.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    /// Prefix prepended to every templated segment name
    pub base_url: String,
    pub representation_id: String,
    /// `SegmentTemplate@initialization`
    pub init_template: String,
    /// `SegmentTemplate@media`
    pub media_template: String,
    pub start_number: u64,
    /// `MPD@mediaPresentationDuration` in seconds, always > 0
    pub total_duration_secs: f64,
    /// `MPD@maxSegmentDuration` in seconds, always > 0
    pub segment_duration_secs: f64,
}

impl Manifest {
    /// Parse manifest XML text.
    pub fn parse(xml: &str) -> Result<Self, ManifestError> {
        let scan = Scan::run(xml)?;

        let base_url = scan.base_url.ok_or(ManifestError::MissingElement {
            element: "BaseURL",
        })?;
        let total = scan
            .presentation_duration
            .ok_or_else(|| ManifestError::missing_attribute(ROOT, "mediaPresentationDuration"))?;
        let segment = scan
            .max_segment_duration
            .ok_or_else(|| ManifestError::missing_attribute(ROOT, "maxSegmentDuration"))?;
        let total_duration_secs = parse_seconds("mediaPresentationDuration", &total)?;
        let segment_duration_secs = parse_seconds("maxSegmentDuration", &segment)?;

        let representation = scan.representation.ok_or(ManifestError::MissingElement {
            element: "Representation",
        })?;
        let representation_id = representation
            .id
            .ok_or_else(|| ManifestError::missing_attribute("Representation", "id"))?;
        let template = representation
            .template
            .ok_or(ManifestError::MissingElement {
                element: "SegmentTemplate",
            })?;
        let init_template = template
            .initialization
            .ok_or_else(|| ManifestError::missing_attribute("SegmentTemplate", "initialization"))?;
        let media_template = template
            .media
            .ok_or_else(|| ManifestError::missing_attribute("SegmentTemplate", "media"))?;
        let start_number = template
            .start_number
            .ok_or_else(|| ManifestError::missing_attribute("SegmentTemplate", "startNumber"))?;
        let start_number = start_number
            .trim()
            .parse::<u64>()
            .map_err(|_| ManifestError::invalid_number("startNumber", start_number.as_str()))?;

        let manifest = Self {
            base_url,
            representation_id,
            init_template,
            media_template,
            start_number,
            total_duration_secs,
            segment_duration_secs,
        };
        debug!(
            representation = %manifest.representation_id,
            duration = manifest.total_duration_secs,
            segment_duration = manifest.segment_duration_secs,
            start_number = manifest.start_number,
            "Parsed DASH manifest"
        );
        Ok(manifest)
    }

    /// `ceil(total_duration / segment_duration)`
    pub fn expected_segment_count(&self) -> u64 {
        (self.total_duration_secs / self.segment_duration_secs).ceil() as u64
    }
}

impl FromStr for Manifest {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Default)]
struct TemplateScan {
    initialization: Option<String>,
    media: Option<String>,
    start_number: Option<String>,
}

#[derive(Debug)]
struct RepresentationScan {
    id: Option<String>,
    depth: usize,
    open: bool,
    template: Option<TemplateScan>,
}

/// Single pass over the document, collecting the raw values of interest.
#[derive(Debug, Default)]
struct Scan {
    depth: usize,
    root_seen: bool,
    presentation_duration: Option<String>,
    max_segment_duration: Option<String>,
    base_url: Option<String>,
    /// Depth and accumulated text of the `BaseURL` element being read
    base_url_pending: Option<(usize, String)>,
    representation: Option<RepresentationScan>,
}

impl Scan {
    fn run(xml: &str) -> Result<Self, ManifestError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut scan = Scan::default();
        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    scan.open(&e, false)?;
                    scan.depth += 1;
                }
                Event::Empty(e) => scan.open(&e, true)?,
                Event::End(_) => {
                    if scan.depth == 0 {
                        return Err(ManifestError::not_well_formed("unmatched end tag"));
                    }
                    scan.depth -= 1;
                    scan.close();
                }
                Event::Text(text) => {
                    if let Some((_, pending)) = scan.base_url_pending.as_mut() {
                        pending.push_str(&text.unescape()?);
                    }
                }
                Event::CData(data) => {
                    if let Some((_, pending)) = scan.base_url_pending.as_mut() {
                        pending.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::Eof => break,
                other => trace!(event = ?other, "Skipping XML event"),
            }
        }

        if !scan.root_seen {
            return Err(ManifestError::not_well_formed("document has no root element"));
        }
        if scan.depth != 0 {
            return Err(ManifestError::not_well_formed(format!(
                "{} element(s) left unclosed at end of document",
                scan.depth
            )));
        }
        Ok(scan)
    }

    fn open(&mut self, e: &BytesStart<'_>, empty: bool) -> Result<(), ManifestError> {
        let depth = self.depth;
        let name = e.local_name();
        let name = name.as_ref();

        if depth == 0 {
            if self.root_seen {
                return Err(ManifestError::not_well_formed("multiple root elements"));
            }
            self.root_seen = true;
            self.presentation_duration = attribute(e, b"mediaPresentationDuration")?;
            self.max_segment_duration = attribute(e, b"maxSegmentDuration")?;
            return Ok(());
        }

        if name == BASE_URL && self.base_url.is_none() && self.base_url_pending.is_none() {
            if empty {
                self.base_url = Some(String::new());
            } else {
                self.base_url_pending = Some((depth, String::new()));
            }
        } else if name == REPRESENTATION && self.representation.is_none() {
            self.representation = Some(RepresentationScan {
                id: attribute(e, b"id")?,
                depth,
                open: !empty,
                template: None,
            });
        } else if name == SEGMENT_TEMPLATE
            && let Some(representation) = self.representation.as_mut()
            && representation.open
            && representation.template.is_none()
            && depth == representation.depth + 1
        {
            representation.template = Some(TemplateScan {
                initialization: attribute(e, b"initialization")?,
                media: attribute(e, b"media")?,
                start_number: attribute(e, b"startNumber")?,
            });
        }

        Ok(())
    }

    /// Called after the depth has been decremented for an end tag.
    fn close(&mut self) {
        let depth = self.depth;
        let base_url_done = matches!(&self.base_url_pending, Some((d, _)) if *d == depth);
        if base_url_done && let Some((_, text)) = self.base_url_pending.take() {
            self.base_url = Some(text.trim().to_string());
        }
        if let Some(representation) = self.representation.as_mut()
            && representation.open
            && representation.depth == depth
        {
            representation.open = false;
        }
    }
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, ManifestError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}
