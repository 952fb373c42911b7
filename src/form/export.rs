use actix_web::web::Bytes;
use chrono::SecondsFormat;
use csv::WriterBuilder;
use secrecy::{ExposeSecret, SecretString};
use std::io::{self, Write};
use tokio::sync::mpsc::Sender;

use crate::error::{AppError, ExportError};
use crate::store::{Store, Submission};

pub const EXPORT_FILENAME: &str = "submissions.csv";

pub const CSV_HEADER: [&str; 6] = [
    "id",
    "first_name",
    "last_name",
    "email",
    "exported",
    "created_at",
];

/// Query parameters accepted by the export endpoint
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExportQuery {
    pub password: Option<String>,
    pub exported: Option<String>,
}

impl ExportQuery {
    /// Parses a raw query string. When a key repeats, the first value wins.
    pub fn from_query_string(query: &str) -> Self {
        let mut parsed = ExportQuery::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "password" if parsed.password.is_none() => {
                    parsed.password = Some(value.into_owned())
                }
                "exported" if parsed.exported.is_none() => {
                    parsed.exported = Some(value.into_owned())
                }
                _ => {}
            }
        }
        parsed
    }

    /// `Some(false)` for `exported=0`, `Some(true)` for `exported=1`,
    /// no filter for anything else
    pub fn exported_filter(&self) -> Option<bool> {
        match self.exported.as_deref() {
            Some("0") => Some(false),
            Some("1") => Some(true),
            _ => None,
        }
    }
}

/// Checks the supplied password against the configured one.
/// With no password configured the export is open.
pub fn authorize_export(
    configured: Option<&SecretString>,
    supplied: Option<&str>,
) -> Result<(), AppError> {
    let Some(expected) = configured else {
        return Ok(());
    };
    match supplied {
        Some(given) if !given.is_empty() && given == expected.expose_secret().as_str() => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

/// CSV fields for one submission
fn csv_record(submission: &Submission) -> [String; 6] {
    [
        submission.id.to_string(),
        submission.first_name.clone(),
        submission.last_name.clone(),
        submission.email.clone(),
        u8::from(submission.exported).to_string(),
        submission.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
    ]
}

/// Writes the header and every matching row to `out`, flushing after each
/// record so rows leave as they are read. Returns the number of rows written.
///
/// A store error returned before anything was written means the query
/// itself failed; callers can tell the two apart via the writer.
pub fn write_export<W: Write>(
    store: &Store,
    filter: Option<bool>,
    out: W,
) -> Result<u64, ExportError> {
    store.read(filter, |rows| {
        let mut wtr = WriterBuilder::new().has_headers(false).from_writer(out);
        wtr.write_record(CSV_HEADER)?;
        wtr.flush().map_err(csv::Error::from)?;

        let mut count = 0;
        for submission in rows {
            let submission = submission?;
            wtr.write_record(&csv_record(&submission))?;
            wtr.flush().map_err(csv::Error::from)?;
            count += 1;
        }
        Ok(count)
    })
}

/// `io::Write` adapter that forwards each flushed chunk to a response stream.
///
/// Must be driven from a blocking thread.
pub struct ChunkSender {
    tx: Sender<Result<Bytes, ExportError>>,
    buf: Vec<u8>,
    sent: bool,
    disconnected: bool,
}

impl ChunkSender {
    pub fn new(tx: Sender<Result<Bytes, ExportError>>) -> Self {
        ChunkSender {
            tx,
            buf: Vec::new(),
            sent: false,
            disconnected: false,
        }
    }

    /// Whether any bytes have reached the response yet
    pub fn has_sent(&self) -> bool {
        self.sent
    }

    /// Whether the response stream went away under us
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// Reports an error on the stream. Only meaningful before output started.
    pub fn fail(&self, err: ExportError) {
        let _ = self.tx.blocking_send(Err(err));
    }
}

impl Write for ChunkSender {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::take(&mut self.buf));
        if self.tx.blocking_send(Ok(chunk)).is_err() {
            self.disconnected = true;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, ExportError::Disconnected));
        }
        self.sent = true;
        Ok(())
    }
}

/// How a streamed export ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Every row was sent
    Complete(u64),
    /// Failed before any output; the error went down the channel
    Rejected,
    /// Failed after output started; logged only
    Truncated,
    /// The receiving side hung up
    Disconnected,
}

/// Runs a full export into `tx`. Failures before the header went out are
/// sent down the channel; later failures can only be logged.
pub fn stream_export(
    store: &Store,
    filter: Option<bool>,
    tx: Sender<Result<Bytes, ExportError>>,
) -> ExportOutcome {
    let mut sink = ChunkSender::new(tx);
    match write_export(store, filter, &mut sink) {
        Ok(rows) => {
            tracing::info!(rows, ?filter, "Export complete");
            ExportOutcome::Complete(rows)
        }
        Err(e) if sink.is_disconnected() => {
            tracing::warn!(error = %e, "Client disconnected during export");
            ExportOutcome::Disconnected
        }
        Err(e) if sink.has_sent() => {
            tracing::error!(error = %e, "Export aborted after output started");
            ExportOutcome::Truncated
        }
        Err(e) => {
            tracing::error!(error = %e, "Select error");
            sink.fail(e);
            ExportOutcome::Rejected
        }
    }
}
