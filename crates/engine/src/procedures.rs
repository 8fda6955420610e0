//! Procedure names and per-stream-type templates
//!
//! These strings are the wire contract with the server-side engine. A
//! dataset qualifies as a stream only if it exposes all of
//! [`STREAM_FINGERPRINT`].

pub const GET_METADATA: &str = "get_metadata";
pub const INSERT_METADATA: &str = "insert_metadata";
pub const DISABLE_METADATA: &str = "disable_metadata";
pub const INIT: &str = "init";
pub const GET_RECORD: &str = "get_record";
pub const GET_INDEX: &str = "get_index";
pub const GET_FIRST_RECORD: &str = "get_first_record";
pub const INSERT_RECORD: &str = "insert_record";
pub const SET_TAXONOMY: &str = "set_taxonomy";
pub const DESCRIBE_TAXONOMIES: &str = "describe_taxonomies";

/// Procedures every stream must expose; absence of any one disqualifies a
/// dataset as a stream.
pub const STREAM_FINGERPRINT: [&str; 3] = [GET_INDEX, GET_RECORD, GET_METADATA];

const SHARED: [&str; 7] = [
    INIT,
    GET_METADATA,
    INSERT_METADATA,
    DISABLE_METADATA,
    GET_RECORD,
    GET_INDEX,
    GET_FIRST_RECORD,
];

/// Procedure set deployed for a primitive stream.
pub fn primitive_template() -> Vec<String> {
    let mut procs: Vec<String> = SHARED.iter().map(|s| s.to_string()).collect();
    procs.push(INSERT_RECORD.to_string());
    procs
}

/// Procedure set deployed for a composed stream.
pub fn composed_template() -> Vec<String> {
    let mut procs: Vec<String> = SHARED.iter().map(|s| s.to_string()).collect();
    procs.push(SET_TAXONOMY.to_string());
    procs.push(DESCRIBE_TAXONOMIES.to_string());
    procs
}
