//! Resource service: CRUD access to the school data collections.
//!
//! DESIGN
//! ======
//! Records are pass-through JSON. The backend owns their schema and
//! validation, so this layer only routes calls and normalizes list bodies;
//! field errors surface as `ApiError::Validation` untouched.

#[cfg(test)]
#[path = "resources_test.rs"]
mod tests;

use serde_json::Value;

use crate::error::ApiError;
use crate::net::client::{ApiClient, ApiRequest};
use crate::net::types::{ListBody, Listing};

// =============================================================================
// TYPES
// =============================================================================

/// A backend collection reachable through the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Staff,
    Students,
    Payroll,
    BulkMessages,
    Users,
    Parents,
    /// Grades per student and course. A report: the portal only lists it.
    StudentPerformance,
}

impl Resource {
    pub const ALL: [Self; 7] = [
        Self::Staff,
        Self::Students,
        Self::Payroll,
        Self::BulkMessages,
        Self::Users,
        Self::Parents,
        Self::StudentPerformance,
    ];

    /// Collection path on the backend, with trailing slash.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Staff => "/staff/",
            Self::Students => "/students/",
            Self::Payroll => "/staff/payroll/",
            Self::BulkMessages => "/communications/bulk-messages/",
            Self::Users => "/users/",
            Self::Parents => "/users/parents/",
            Self::StudentPerformance => "/reports/student-performance/",
        }
    }

    /// Path under `/api/` the portal exposes this collection at, without
    /// slashes at either end.
    #[must_use]
    pub fn segment(self) -> &'static str {
        match self {
            Self::Staff => "staff",
            Self::Students => "students",
            Self::Payroll => "payroll",
            Self::BulkMessages => "bulk-messages",
            Self::Users => "users",
            Self::Parents => "parents",
            Self::StudentPerformance => "reports/student-performance",
        }
    }

    #[must_use]
    pub fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.segment() == segment)
    }

    #[must_use]
    pub fn item_path(self, id: i64) -> String {
        format!("{}{id}/", self.path())
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// CRUD calls for one collection.
#[derive(Debug, Clone)]
pub struct ResourceClient {
    client: ApiClient,
    resource: Resource,
}

impl ResourceClient {
    #[must_use]
    pub fn new(client: ApiClient, resource: Resource) -> Self {
        Self { client, resource }
    }

    #[must_use]
    pub fn resource(&self) -> Resource {
        self.resource
    }

    /// List records. `query` is forwarded as-is (`page`, `page_size`,
    /// `search`, `recipient_group`, ...).
    ///
    /// # Errors
    ///
    /// Any `ApiError` from the request client; `Schema` if the body is
    /// neither an array nor a page envelope.
    pub async fn list(&self, query: &[(String, String)]) -> Result<Listing<Value>, ApiError> {
        let request = ApiRequest::get(self.resource.path()).query(query.iter().cloned());
        let body: ListBody<Value> = self.client.send_json(request).await?;
        let listing = Listing::from(body);
        tracing::debug!(resource = self.resource.segment(), count = listing.count, "listed");
        Ok(listing)
    }

    /// # Errors
    ///
    /// Any `ApiError` from the request client.
    pub async fn get(&self, id: i64) -> Result<Value, ApiError> {
        self.client.get_json(&self.resource.item_path(id)).await
    }

    /// Create a record, returning the backend's success status with it.
    ///
    /// # Errors
    ///
    /// `Validation` when the backend rejects fields.
    pub async fn create(&self, record: Value) -> Result<(u16, Value), ApiError> {
        let (status, created): (u16, Value) = self
            .client
            .send_json_with_status(ApiRequest::post(self.resource.path()).json(record))
            .await?;
        tracing::info!(resource = self.resource.segment(), id = %created["id"], status, "record created");
        Ok((status, created))
    }

    /// Replace a record.
    ///
    /// # Errors
    ///
    /// `Validation` when the backend rejects fields.
    pub async fn update(&self, id: i64, record: Value) -> Result<Value, ApiError> {
        self.client
            .send_json(ApiRequest::put(self.resource.item_path(id)).json(record))
            .await
    }

    /// Update only the given fields.
    ///
    /// # Errors
    ///
    /// `Validation` when the backend rejects fields.
    pub async fn patch(&self, id: i64, fields: Value) -> Result<Value, ApiError> {
        self.client
            .send_json(ApiRequest::patch(self.resource.item_path(id)).json(fields))
            .await
    }

    /// # Errors
    ///
    /// Any `ApiError` from the request client.
    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        self.client
            .send_empty(ApiRequest::delete(self.resource.item_path(id)))
            .await?;
        tracing::info!(resource = self.resource.segment(), id, "record deleted");
        Ok(())
    }
}
