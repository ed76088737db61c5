use serde::Deserialize;

/// Stability class of cached report data
///
/// TTL is a property of the kind of data, not of an individual call.
/// Weekly summaries barely move; live task listings go stale in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlClass {
    /// Weekly roll-up reports (most stable)
    Weekly,

    /// Daily summaries
    Daily,

    /// Project/task listings
    Listing,

    /// Live status data (least stable)
    Live,
}

impl TtlClass {
    pub const ALL: [TtlClass; 4] = [TtlClass::Weekly, TtlClass::Daily, TtlClass::Listing, TtlClass::Live];

    pub fn as_str(&self) -> &'static str {
        match self {
            TtlClass::Weekly => "weekly",
            TtlClass::Daily => "daily",
            TtlClass::Listing => "listing",
            TtlClass::Live => "live",
        }
    }
}
