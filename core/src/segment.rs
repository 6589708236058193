//! Module segmentation of raw `pminfo` reports.
//!
//! SMCIPMITool prints one section per power-supply module:
//!
//! ```text
//!  [SlaveAddress = 78h] [Module 1]
//!  Item                           |                          Value
//!  ----                           |                          -----
//!  Status                         |              [STATUS OK](00h)
//!  Input Power                    |                          198 W
//!
//!  [SlaveAddress = 7Ah] [Module 2]
//!  ...
//! ```
//!
//! Older tool versions print a bare `[Module N]` header. The default
//! [`Segmenter`] accepts both; a custom header regex can be supplied for
//! other tool versions.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::types::ModuleBlock;

/// Default module header: optional slave-address tag, then `[Module N]`, at
/// the start of a line.
pub const DEFAULT_MODULE_PATTERN: &str =
    r"(?m)^[ \t]*(?:\[SlaveAddress[ \t]*=[ \t]*(?P<address>[0-9A-Za-z]+)\][ \t]*)?\[Module[ \t]+(?P<index>[0-9]+)\]";

static DEFAULT_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_MODULE_PATTERN).expect("static regex must compile"));

/// Errors raised when building a [`Segmenter`] from a custom pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    /// The pattern is not a valid regular expression.
    #[error("invalid module pattern: {0}")]
    Invalid(#[from] regex::Error),
    /// The pattern lacks a required named capture group.
    #[error("module pattern has no `{0}` capture group")]
    MissingGroup(&'static str),
}

/// Splits raw reports into [`ModuleBlock`]s.
///
/// A block starts after a header match and ends at the first blank line,
/// the next header, or the end of input, whichever comes first.
///
/// # Examples
///
/// ```
/// use smcipmi_exporter_core::Segmenter;
///
/// let raw = "[Module 1]\nStatus | [STATUS OK]\n\n[Module 2]\nStatus | [UNIT IS OFF]\n";
/// let blocks = Segmenter::default().segment(raw);
///
/// assert_eq!(blocks.len(), 2);
/// assert_eq!(blocks[0].index, "1");
/// assert!(blocks[1].body.contains("UNIT IS OFF"));
/// ```
#[derive(Debug, Clone)]
pub struct Segmenter {
    header: Regex,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self {
            header: DEFAULT_HEADER.clone(),
        }
    }
}

struct Header {
    start: usize,
    end: usize,
    index: String,
    address: Option<String>,
}

impl Segmenter {
    /// Builds a segmenter from a custom header pattern.
    ///
    /// The pattern must define a named group `index`; a group named
    /// `address` is picked up when present.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::Invalid`] if the regex does not compile and
    /// [`PatternError::MissingGroup`] if it has no `index` group.
    pub fn with_pattern(pattern: &str) -> Result<Self, PatternError> {
        let header = Regex::new(pattern)?;
        if !header.capture_names().flatten().any(|name| name == "index") {
            return Err(PatternError::MissingGroup("index"));
        }
        Ok(Self { header })
    }

    /// The header regex in use.
    pub fn pattern(&self) -> &str {
        self.header.as_str()
    }

    /// Splits `raw` into module blocks in source order.
    ///
    /// Reports without any header yield an empty list.
    pub fn segment(&self, raw: &str) -> Vec<ModuleBlock> {
        let text = normalize_line_endings(raw);
        let headers: Vec<Header> = self
            .header
            .captures_iter(&text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                Some(Header {
                    start: whole.start(),
                    end: whole.end(),
                    index: caps.name("index")?.as_str().to_string(),
                    address: caps.name("address").map(|m| m.as_str().to_string()),
                })
            })
            .collect();

        headers
            .iter()
            .enumerate()
            .map(|(position, header)| {
                let limit = headers
                    .get(position + 1)
                    .map_or(text.len(), |next| next.start);
                ModuleBlock {
                    index: header.index.clone(),
                    address: header.address.clone(),
                    body: section_body(&text[header.end..limit]).to_string(),
                }
            })
            .collect()
    }
}

/// Splits `raw` with the default header pattern.
pub fn segment(raw: &str) -> Vec<ModuleBlock> {
    Segmenter::default().segment(raw)
}

fn normalize_line_endings(raw: &str) -> Cow<'_, str> {
    if raw.contains('\r') {
        Cow::Owned(raw.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(raw)
    }
}

/// Cuts `region` at its first blank line. The first segment is the rest of
/// the header line and never counts as blank.
fn section_body(region: &str) -> &str {
    let mut offset = 0;
    for line in region.split_inclusive('\n') {
        if offset > 0 && line.trim().is_empty() {
            return &region[..offset];
        }
        offset += line.len();
    }
    region
}
