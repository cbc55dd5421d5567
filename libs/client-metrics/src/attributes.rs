//! Tags attached to every metrics record.

use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use tonic::Code;

/// Cluster label used before the server reports one.
pub const UNSPECIFIED_CLUSTER: &str = "<unspecified>";

/// Zone label used before the server reports one.
pub const GLOBAL_ZONE: &str = "global";

/// Client name reported with every record.
pub const DEFAULT_CLIENT_NAME: &str = concat!("rust-bigtable/", env!("CARGO_PKG_VERSION"));

/// Data API methods that are traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Display, AsRefStr, EnumString, EnumIter)]
pub enum MethodName {
    #[strum(serialize = "Bigtable.ReadRows")]
    ReadRows,
    #[strum(serialize = "Bigtable.MutateRow")]
    MutateRow,
    #[strum(serialize = "Bigtable.CheckAndMutateRow")]
    CheckAndMutateRow,
    #[strum(serialize = "Bigtable.ReadModifyWriteRow")]
    ReadModifyWriteRow,
    #[strum(serialize = "Bigtable.SampleRowKeys")]
    SampleRowKeys,
    #[strum(serialize = "Bigtable.MutateRows")]
    MutateRows,
}

impl MethodName {
    /// Whether the RPC behind this method streams its responses.
    pub fn streaming(&self) -> StreamingState {
        match self {
            Self::ReadRows | Self::SampleRowKeys | Self::MutateRows => StreamingState::Streaming,
            Self::MutateRow | Self::CheckAndMutateRow | Self::ReadModifyWriteRow => {
                StreamingState::Unary
            }
        }
    }

    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }
}

/// Streaming label value. The backend expects the literal strings
/// `"true"` / `"false"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Display, AsRefStr, EnumString)]
pub enum StreamingState {
    #[strum(serialize = "true")]
    Streaming,
    #[strum(serialize = "false")]
    Unary,
}

/// Tag set shared by attempt and operation records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricAttributes {
    pub project_id: Option<String>,
    pub instance_id: String,
    pub table_id: String,
    pub app_profile_id: Option<String>,
    /// Learned from the response params trailer; `None` until then.
    pub cluster: Option<String>,
    /// Learned from the response params trailer; `None` until then.
    pub zone: Option<String>,
    pub method: MethodName,
    pub streaming: StreamingState,
    pub client_name: String,
    pub client_uid: String,
}

impl MetricAttributes {
    pub fn cluster_label(&self) -> &str {
        self.cluster.as_deref().unwrap_or(UNSPECIFIED_CLUSTER)
    }

    pub fn zone_label(&self) -> &str {
        self.zone.as_deref().unwrap_or(GLOBAL_ZONE)
    }

    /// Label pairs in export order. The app profile is only present when set.
    pub fn labels(&self) -> Vec<(&'static str, String)> {
        let mut labels = vec![
            ("project_id", self.project_id.clone().unwrap_or_default()),
            ("instance", self.instance_id.clone()),
            ("table", self.table_id.clone()),
            ("cluster", self.cluster_label().to_string()),
            ("zone", self.zone_label().to_string()),
            ("method", self.method.to_string()),
            ("streaming", self.streaming.to_string()),
            ("client_name", self.client_name.clone()),
            ("client_uid", self.client_uid.clone()),
        ];
        if let Some(app_profile) = &self.app_profile_id {
            labels.push(("app_profile", app_profile.clone()));
        }
        labels
    }

    /// Fixed-order `;`-joined rendering used as a series key:
    /// `project;instance;table;cluster;zone;app_profile;method;streaming;client_name`.
    /// Unknown values render as the empty string.
    pub fn to_label_string(&self) -> String {
        let p = |value: Option<&str>| value.unwrap_or_default().to_string();
        [
            p(self.project_id.as_deref()),
            self.instance_id.clone(),
            self.table_id.clone(),
            p(self.cluster.as_deref()),
            p(self.zone.as_deref()),
            p(self.app_profile_id.as_deref()),
            self.method.to_string(),
            self.streaming.to_string(),
            self.client_name.clone(),
        ]
        .join(";")
    }
}

/// Canonical gRPC status name used as the `status` label.
pub fn status_label(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "CANCELLED",
        Code::Unknown => "UNKNOWN",
        Code::InvalidArgument => "INVALID_ARGUMENT",
        Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
        Code::NotFound => "NOT_FOUND",
        Code::AlreadyExists => "ALREADY_EXISTS",
        Code::PermissionDenied => "PERMISSION_DENIED",
        Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
        Code::FailedPrecondition => "FAILED_PRECONDITION",
        Code::Aborted => "ABORTED",
        Code::OutOfRange => "OUT_OF_RANGE",
        Code::Unimplemented => "UNIMPLEMENTED",
        Code::Internal => "INTERNAL",
        Code::Unavailable => "UNAVAILABLE",
        Code::DataLoss => "DATA_LOSS",
        Code::Unauthenticated => "UNAUTHENTICATED",
    }
}

/// Generates a process-unique client identifier:
/// `rust-<uuid v4>-<pid><hostname>`.
pub fn generate_client_uid() -> String {
    let hostname = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    format!(
        "rust-{}-{}{}",
        uuid::Uuid::new_v4(),
        std::process::id(),
        hostname
    )
}
