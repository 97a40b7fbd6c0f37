/// HTTP endpoint paths, relative to an optional namespace prefix.
pub mod endpoints {
    pub const GET_REFS: &str = "/getRefs";
    pub const HAS_REFS: &str = "/hasRefs";
    pub const WRITE_VALUE: &str = "/writeValue";
    pub const ROOT: &str = "/root";
    pub const POST_REFS: &str = "/postRefs";
    /// Followed by `/<hash>`.
    pub const REF: &str = "/ref";
}

/// Query and form parameter names.
pub mod params {
    pub const REF: &str = "ref";
    pub const CURRENT: &str = "current";
    pub const LAST: &str = "last";
    pub const ALL: &str = "all";
    pub const EXCLUDE: &str = "exclude";
}

/// Header carried by every response, naming the protocol version.
pub const VERSION_HEADER: &str = "x-cairn-vers";

/// Version string both sides must agree on.
pub const PROTOCOL_VERSION: &str = "1";

/// Upper bound on a decompressed request or response body.
pub const MAX_BODY_SIZE: usize = 64 * 1024 * 1024;

/// Path of the single-chunk or reachable-closure endpoint for `hash`.
pub fn ref_path(hash: &cairn_types::Hash) -> String {
    format!("{}/{hash}", endpoints::REF)
}
