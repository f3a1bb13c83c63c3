//! Event contract: envelope, typed payloads, validation, paths, cursor.

pub mod cursor;
pub mod envelope;
pub mod path;
pub mod payload;
pub mod schema;
pub mod timefmt;

pub use cursor::EventCursor;
pub use envelope::{EventEnvelope, SCHEMA_VERSION};
pub use path::ViewCollection;
pub use payload::{
    AccelerationAppliedPayload, AnnotationAction, CardAnnotationUpdatedPayload,
    CardReviewedPayload, CertificationResult, ContentFlaggedPayload, Direction, EventKind,
    EventPayload, ExplanationQuality, FlagReason, Grade, IdRename, IdRenames,
    InterventionAcceptedPayload, InterventionRejectedPayload, LapseAppliedPayload,
    LibraryIdMapAppliedPayload, MasteryCertificationCompletedPayload,
    MasteryCertificationStartedPayload, MisconceptionProbeResultPayload,
    QuestionAttemptedPayload, RelationshipReviewedPayload, SessionEndedPayload,
    SessionStartedPayload,
};
