pub mod submission;
pub mod export;

pub use submission::{
    parse_submission, record_submission, validate_submission, FormSubmissionRequest,
    SubmissionResponse,
};
pub use export::{
    authorize_export, stream_export, write_export, ExportOutcome, ExportQuery, CSV_HEADER,
    EXPORT_FILENAME,
};
