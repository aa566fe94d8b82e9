//! Static stream registry for the Copper developer API.
//!
//! Every extractable stream is declared here once, at compile time: its
//! endpoint, primary key, replication method, bookmark field, and
//! parent/child relationships. The registry is pure data with no I/O, so
//! catalogs derived from it are reproducible run over run.

/// Replication strategy for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationMethod {
    /// Refetch everything on every run.
    FullTable,
    /// Fetch only records changed since the stream's bookmark.
    Incremental,
}

impl ReplicationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicationMethod::FullTable => "FULL_TABLE",
            ReplicationMethod::Incremental => "INCREMENTAL",
        }
    }
}

impl std::fmt::Display for ReplicationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP method for a stream's endpoint. Copper exposes small lookup tables
/// as plain GET lists and the large entity collections as POST search
/// endpoints with page-number pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// How a child stream filters its search body by the parent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentFilter {
    /// Body field carrying the parent id (e.g. `company_ids`).
    pub field: &'static str,
    /// Whether the field takes a list of ids rather than a scalar.
    pub list: bool,
}

/// One stream definition. Immutable, defined once at process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDef {
    pub name: &'static str,
    /// Endpoint path relative to the API base URL.
    pub path: &'static str,
    pub method: HttpMethod,
    pub key_properties: &'static [&'static str],
    pub replication: ReplicationMethod,
    /// Replication key, present exactly when the stream is INCREMENTAL.
    pub bookmark_field: Option<&'static str>,
    /// Envelope field holding the record array on GET list endpoints.
    /// `None` on a GET endpoint means the response is a single object.
    pub data_key: Option<&'static str>,
    /// Streams whose rows are fetched per record of this stream.
    pub children: &'static [&'static str],
    pub parent: Option<&'static str>,
    pub parent_filter: Option<ParentFilter>,
}

impl StreamDef {
    pub fn is_incremental(&self) -> bool {
        self.replication == ReplicationMethod::Incremental
    }

    /// Search endpoints paginate by page number; GET endpoints return a
    /// single page.
    pub fn is_search(&self) -> bool {
        self.method == HttpMethod::Post
    }
}

const COMPANY_IDS: ParentFilter = ParentFilter {
    field: "company_ids",
    list: true,
};

const PIPELINE_ID: ParentFilter = ParentFilter {
    field: "pipeline_id",
    list: false,
};

/// The full stream table, in catalog order.
pub const STREAMS: &[StreamDef] = &[
    StreamDef {
        name: "account",
        path: "account",
        method: HttpMethod::Get,
        key_properties: &["id"],
        replication: ReplicationMethod::FullTable,
        bookmark_field: None,
        data_key: None,
        children: &[],
        parent: None,
        parent_filter: None,
    },
    StreamDef {
        name: "users",
        path: "users/search",
        method: HttpMethod::Post,
        key_properties: &["id"],
        replication: ReplicationMethod::FullTable,
        bookmark_field: None,
        data_key: None,
        children: &[],
        parent: None,
        parent_filter: None,
    },
    StreamDef {
        name: "leads",
        path: "leads/search",
        method: HttpMethod::Post,
        key_properties: &["id"],
        replication: ReplicationMethod::Incremental,
        bookmark_field: Some("date_modified"),
        data_key: None,
        children: &[],
        parent: None,
        parent_filter: None,
    },
    StreamDef {
        name: "people",
        path: "people/search",
        method: HttpMethod::Post,
        key_properties: &["id"],
        replication: ReplicationMethod::Incremental,
        bookmark_field: Some("date_modified"),
        data_key: None,
        children: &[],
        parent: Some("companies"),
        parent_filter: Some(COMPANY_IDS),
    },
    StreamDef {
        name: "companies",
        path: "companies/search",
        method: HttpMethod::Post,
        key_properties: &["id"],
        replication: ReplicationMethod::Incremental,
        bookmark_field: Some("date_modified"),
        data_key: None,
        children: &["people", "opportunities"],
        parent: None,
        parent_filter: None,
    },
    StreamDef {
        name: "opportunities",
        path: "opportunities/search",
        method: HttpMethod::Post,
        key_properties: &["id"],
        replication: ReplicationMethod::Incremental,
        bookmark_field: Some("date_modified"),
        data_key: None,
        children: &[],
        parent: Some("companies"),
        parent_filter: Some(COMPANY_IDS),
    },
    StreamDef {
        name: "projects",
        path: "projects/search",
        method: HttpMethod::Post,
        key_properties: &["id"],
        replication: ReplicationMethod::Incremental,
        bookmark_field: Some("date_modified"),
        data_key: None,
        children: &[],
        parent: None,
        parent_filter: None,
    },
    StreamDef {
        name: "customer_sources",
        path: "customer_sources",
        method: HttpMethod::Get,
        key_properties: &["id"],
        replication: ReplicationMethod::FullTable,
        bookmark_field: None,
        data_key: Some("customer_sources"),
        children: &[],
        parent: None,
        parent_filter: None,
    },
    StreamDef {
        name: "lead_statuses",
        path: "lead_statuses",
        method: HttpMethod::Get,
        key_properties: &["id"],
        replication: ReplicationMethod::FullTable,
        bookmark_field: None,
        data_key: Some("lead_statuses"),
        children: &[],
        parent: None,
        parent_filter: None,
    },
    StreamDef {
        name: "contact_types",
        path: "contact_types",
        method: HttpMethod::Get,
        key_properties: &["id"],
        replication: ReplicationMethod::FullTable,
        bookmark_field: None,
        data_key: Some("contact_types"),
        children: &[],
        parent: None,
        parent_filter: None,
    },
    StreamDef {
        name: "loss_reasons",
        path: "loss_reasons",
        method: HttpMethod::Get,
        key_properties: &["id"],
        replication: ReplicationMethod::FullTable,
        bookmark_field: None,
        data_key: Some("loss_reasons"),
        children: &[],
        parent: None,
        parent_filter: None,
    },
    StreamDef {
        name: "pipelines",
        path: "pipelines",
        method: HttpMethod::Get,
        key_properties: &["id"],
        replication: ReplicationMethod::FullTable,
        bookmark_field: None,
        data_key: Some("pipelines"),
        children: &["pipeline_stages"],
        parent: None,
        parent_filter: None,
    },
    StreamDef {
        name: "pipeline_stages",
        path: "pipeline_stages/search",
        method: HttpMethod::Post,
        key_properties: &["id"],
        replication: ReplicationMethod::FullTable,
        bookmark_field: None,
        data_key: None,
        children: &[],
        parent: Some("pipelines"),
        parent_filter: Some(PIPELINE_ID),
    },
    StreamDef {
        name: "tags",
        path: "tags",
        method: HttpMethod::Get,
        key_properties: &["id"],
        replication: ReplicationMethod::FullTable,
        bookmark_field: None,
        data_key: Some("tags"),
        children: &[],
        parent: None,
        parent_filter: None,
    },
    StreamDef {
        name: "custom_field_definitions",
        path: "custom_field_definitions",
        method: HttpMethod::Get,
        key_properties: &["id"],
        replication: ReplicationMethod::FullTable,
        bookmark_field: None,
        data_key: Some("custom_field_definitions"),
        children: &[],
        parent: None,
        parent_filter: None,
    },
    StreamDef {
        name: "activities",
        path: "activities/search",
        method: HttpMethod::Post,
        key_properties: &["id"],
        replication: ReplicationMethod::Incremental,
        bookmark_field: Some("date_modified"),
        data_key: None,
        children: &[],
        parent: None,
        parent_filter: None,
    },
    StreamDef {
        name: "tasks",
        path: "tasks/search",
        method: HttpMethod::Post,
        key_properties: &["id"],
        replication: ReplicationMethod::Incremental,
        bookmark_field: Some("date_modified"),
        data_key: None,
        children: &[],
        parent: None,
        parent_filter: None,
    },
];

/// All stream definitions in catalog order. Deterministic and stable across
/// runs.
pub fn all_streams() -> &'static [StreamDef] {
    STREAMS
}

/// Look up a stream by name.
pub fn get(name: &str) -> Option<&'static StreamDef> {
    STREAMS.iter().find(|s| s.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_order_is_stable() {
        let first: Vec<&str> = all_streams().iter().map(|s| s.name).collect();
        let second: Vec<&str> = all_streams().iter().map(|s| s.name).collect();
        assert_eq!(first, second);
        assert_eq!(first[0], "account");
    }

    #[test]
    fn test_incremental_streams_have_bookmark_fields() {
        for def in all_streams() {
            assert_eq!(
                def.is_incremental(),
                def.bookmark_field.is_some(),
                "{} bookmark field does not match replication method",
                def.name
            );
        }
    }

    #[test]
    fn test_parent_child_links_are_consistent() {
        for def in all_streams() {
            for child_name in def.children {
                let child = get(child_name).expect("child stream must exist");
                assert_eq!(child.parent, Some(def.name));
                assert!(child.parent_filter.is_some());
            }
            if let Some(parent_name) = def.parent {
                let parent = get(parent_name).expect("parent stream must exist");
                assert!(parent.children.contains(&def.name));
            }
        }
    }

    #[test]
    fn test_search_endpoints_are_post() {
        for def in all_streams() {
            assert_eq!(def.path.ends_with("/search"), def.is_search(), "{}", def.name);
        }
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<&str> = all_streams().iter().map(|s| s.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), all_streams().len());
    }
}
