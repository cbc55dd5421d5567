//! Resource context a tracer is bound to.

/// Read-only view of the table an operation targets.
///
/// Implemented by the surrounding client's table handle; the factory reads it
/// once when building a tracer.
pub trait TableContext {
    fn table_id(&self) -> &str;

    fn instance_id(&self) -> &str;

    fn app_profile_id(&self) -> Option<&str> {
        None
    }

    fn project_id(&self) -> Option<&str> {
        None
    }
}

/// Owned table coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableResource {
    pub project_id: Option<String>,
    pub instance_id: String,
    pub table_id: String,
    pub app_profile_id: Option<String>,
}

impl TableResource {
    pub fn new(instance_id: impl Into<String>, table_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            table_id: table_id.into(),
            ..Self::default()
        }
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_app_profile_id(mut self, app_profile_id: impl Into<String>) -> Self {
        self.app_profile_id = Some(app_profile_id.into());
        self
    }
}

impl TableContext for TableResource {
    fn table_id(&self) -> &str {
        &self.table_id
    }

    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn app_profile_id(&self) -> Option<&str> {
        self.app_profile_id.as_deref()
    }

    fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }
}
