//! JUnit XML report reader.
//!
//! Turns `<testcase>` elements into [`TestResult`] values keyed by the Jira
//! issue embedded in the test name. Test cases whose name carries no key are
//! dropped.

pub mod key;

use std::path::{Path, PathBuf};
use std::time::Duration;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tracing::debug;

use crate::model::{OutcomeKind, TestResult};

pub use self::key::issue_key;

#[derive(Debug, Error)]
pub enum JunitError {
    #[error("failed to read report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed report {path}: {source}")]
    Xml {
        path: PathBuf,
        #[source]
        source: quick_xml::Error,
    },
}

/// Load the results of all given report files, in order.
pub fn load_results<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<TestResult>, JunitError> {
    let mut results = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path).map_err(|source| JunitError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed = parse_str(&xml).map_err(|source| JunitError::Xml {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), count = parsed.len(), "loaded report");
        results.extend(parsed);
    }
    Ok(results)
}

/// Parse one JUnit document. `<testcase>` elements are found at any depth.
pub fn parse_str(xml: &str) -> Result<Vec<TestResult>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut results = Vec::new();
    let mut case: Option<CaseBuilder> = None;
    let mut depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                if let Some(c) = case.as_mut() {
                    if depth == c.depth + 1 {
                        c.open_child(&e)?;
                    }
                } else if e.name().as_ref() == b"testcase" {
                    case = Some(CaseBuilder::new(&e, depth)?);
                }
            }
            Event::Empty(e) => {
                if let Some(c) = case.as_mut() {
                    if depth == c.depth {
                        c.open_child(&e)?;
                        c.close_child();
                    }
                } else if e.name().as_ref() == b"testcase" {
                    results.extend(CaseBuilder::new(&e, depth + 1)?.finish());
                }
            }
            Event::Text(t) => {
                if let Some(c) = case.as_mut() {
                    c.push_text(&t.unescape()?);
                }
            }
            Event::CData(t) => {
                if let Some(c) = case.as_mut() {
                    c.push_text(&String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Event::End(_) => {
                if case.as_ref().is_some_and(|c| depth == c.depth) {
                    results.extend(case.take().and_then(CaseBuilder::finish));
                } else if let Some(c) = case.as_mut().filter(|c| depth == c.depth + 1) {
                    c.close_child();
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof if case.is_some() => {
                return Err(quick_xml::Error::UnexpectedEof("testcase".into()));
            }
            Event::Eof if depth != 0 => {
                return Err(quick_xml::Error::UnexpectedEof("testsuite".into()));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(results)
}

#[derive(Debug)]
enum Section {
    Failure { message: String },
    Error { message: String },
    SystemOut,
    SystemErr,
}

/// Accumulates the state of one `<testcase>` while its children stream by.
#[derive(Debug, Default)]
struct CaseBuilder {
    depth: usize,
    name: String,
    time: Option<String>,
    failure: Option<String>,
    error: Option<String>,
    skipped: bool,
    system_out: Option<String>,
    system_err: Option<String>,
    open: Option<Section>,
    text: String,
}

impl CaseBuilder {
    fn new(e: &BytesStart<'_>, depth: usize) -> Result<Self, quick_xml::Error> {
        Ok(Self {
            depth,
            name: attribute(e, "name")?.unwrap_or_default(),
            time: attribute(e, "time")?,
            ..Self::default()
        })
    }

    fn open_child(&mut self, e: &BytesStart<'_>) -> Result<(), quick_xml::Error> {
        self.text.clear();
        self.open = match e.name().as_ref() {
            b"failure" => Some(Section::Failure {
                message: attribute(e, "message")?.unwrap_or_default(),
            }),
            b"error" => Some(Section::Error {
                message: attribute(e, "message")?.unwrap_or_default(),
            }),
            b"system-out" => Some(Section::SystemOut),
            b"system-err" => Some(Section::SystemErr),
            b"skipped" => {
                self.skipped = true;
                None
            }
            _ => None,
        };
        Ok(())
    }

    fn push_text(&mut self, text: &str) {
        if self.open.is_some() {
            self.text.push_str(text);
        }
    }

    /// Only the first element of each kind counts.
    fn close_child(&mut self) {
        let text = std::mem::take(&mut self.text);
        match self.open.take() {
            Some(Section::Failure { message }) if self.failure.is_none() => {
                self.failure = Some(format!("{message}\n{text}"));
            }
            Some(Section::Error { message }) if self.error.is_none() => {
                self.error = Some(format!("{message}\n{text}"));
            }
            Some(Section::SystemOut) if self.system_out.is_none() => {
                self.system_out = Some(text);
            }
            Some(Section::SystemErr) if self.system_err.is_none() => {
                self.system_err = Some(text);
            }
            _ => {}
        }
    }

    fn outcome(&self) -> OutcomeKind {
        if self.failure.is_some() || self.error.is_some() {
            OutcomeKind::Failed
        } else if self.skipped {
            OutcomeKind::NotExecuted
        } else {
            OutcomeKind::Success
        }
    }

    fn message(&self) -> Option<String> {
        let mut message = String::new();
        for section in [&self.failure, &self.error] {
            if let Some(text) = section {
                message.push_str(text);
                message.push('\n');
            }
        }
        for stream in [&self.system_out, &self.system_err] {
            if let Some(text) = stream.as_deref().filter(|t| !t.trim().is_empty()) {
                message.push_str(text);
                message.push('\n');
            }
        }
        (!message.is_empty()).then_some(message)
    }

    fn duration(&self) -> Option<Duration> {
        let secs: f64 = self.time.as_deref()?.trim().parse().ok()?;
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        Some(Duration::from_millis((secs * 1000.0).round() as u64))
    }

    fn finish(self) -> Option<TestResult> {
        let Some(key) = issue_key(&self.name) else {
            debug!(name = %self.name, "test name carries no issue key, dropping");
            return None;
        };
        Some(TestResult {
            key,
            outcome: self.outcome(),
            message: self.message(),
            duration: self.duration(),
        })
    }
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, quick_xml::Error> {
    match e.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}
