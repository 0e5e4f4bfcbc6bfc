use bytes::Bytes;
use serde::Serialize;

/// Percent reported by the terminal event of a successful download.
pub const DONE_PERCENT: u32 = 100;

/// One record of the `/download` response body.
///
/// Serialized as a single JSON object per line, tagged by `kind`:
/// `{"kind":"progress","percent":42.1}`, `{"kind":"done","percent":100}`,
/// `{"kind":"error","code":1}`. A `null` code means the process was killed
/// (signal or timeout) rather than exiting on its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    Progress { percent: f64 },
    Done { percent: u32 },
    Error { code: Option<i32> },
}

impl ProgressEvent {
    pub fn progress(percent: f64) -> Self {
        Self::Progress { percent }
    }

    pub fn done() -> Self {
        Self::Done {
            percent: DONE_PERCENT,
        }
    }

    pub fn error(code: Option<i32>) -> Self {
        Self::Error { code }
    }

    /// `done` and `error` end a session; nothing may follow them.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }

    /// JSON encoding followed by `\n`.
    pub fn to_ndjson_line(&self) -> Result<Bytes, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(Bytes::from(line))
    }
}
