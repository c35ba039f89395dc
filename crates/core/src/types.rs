/// Node identifiers are opaque strings assigned by whatever tool
/// exported the workflow (e.g. `"3"`, `"6"`).
pub type NodeId = String;

/// History and archive timestamps are recorded in local time, matching
/// the filenames the image server itself writes.
pub type Timestamp = chrono::DateTime<chrono::Local>;
