use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use sheetmap_model::{
    ColumnCandidate, ColumnMapping, DisambiguationContext, DisambiguationRequest,
    DisambiguationResponse,
};
use uuid::Uuid;

use crate::error::{MappingError, Result};

/// Pending "which column did you mean?" questions, held in process memory.
///
/// Requests expire `ttl` after creation. Expiry is checked lazily on access;
/// [`DisambiguationHandler::cleanup_expired`] sweeps everything at once.
pub struct DisambiguationHandler {
    pending: Mutex<HashMap<Uuid, DisambiguationRequest>>,
    ttl: Duration,
}

impl DisambiguationHandler {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn create_request(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        header_text: &str,
        candidates: Vec<ColumnCandidate>,
    ) -> DisambiguationRequest {
        self.create_request_at(spreadsheet_id, sheet_name, header_text, candidates, Utc::now())
    }

    pub fn create_request_at(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        header_text: &str,
        candidates: Vec<ColumnCandidate>,
        now: DateTime<Utc>,
    ) -> DisambiguationRequest {
        let request = DisambiguationRequest {
            request_id: Uuid::new_v4(),
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_name: sheet_name.to_string(),
            header_text: header_text.to_string(),
            candidates,
            created_at: now,
        };
        log::info!(
            "created disambiguation request {} for header '{}' with {} candidates",
            request.request_id,
            header_text,
            request.candidates.len()
        );
        self.lock().insert(request.request_id, request.clone());
        request
    }

    pub fn get_request(&self, request_id: Uuid) -> Option<DisambiguationRequest> {
        self.get_request_at(request_id, Utc::now())
    }

    /// The pending request, or `None` if unknown or expired (an expired request is purged).
    pub fn get_request_at(&self, request_id: Uuid, now: DateTime<Utc>) -> Option<DisambiguationRequest> {
        let mut pending = self.lock();
        let request = pending.get(&request_id)?.clone();
        if self.is_expired(&request, now) {
            log::info!("disambiguation request {request_id} has expired");
            pending.remove(&request_id);
            return None;
        }
        Some(request)
    }

    pub fn resolve(&self, response: &DisambiguationResponse) -> Result<(DisambiguationRequest, ColumnCandidate)> {
        self.resolve_at(response, Utc::now())
    }

    /// Consume the request and return it together with the chosen candidate.
    ///
    /// An out-of-range selection fails with `InvalidSelection` and leaves the request
    /// pending so the caller can answer again.
    pub fn resolve_at(
        &self,
        response: &DisambiguationResponse,
        now: DateTime<Utc>,
    ) -> Result<(DisambiguationRequest, ColumnCandidate)> {
        let mut pending = self.lock();
        let expired = match pending.get(&response.request_id) {
            Some(request) => self.is_expired(request, now),
            None => return Err(MappingError::RequestNotFound(response.request_id)),
        };
        if expired {
            log::info!("disambiguation request {} has expired", response.request_id);
            pending.remove(&response.request_id);
            return Err(MappingError::RequestNotFound(response.request_id));
        }

        let selected = response.selected_column_index;
        let candidates = &pending[&response.request_id].candidates;
        let Some(candidate) = candidates.get(selected).cloned() else {
            return Err(MappingError::InvalidSelection {
                selected,
                candidates: candidates.len(),
            });
        };

        log::info!(
            "resolved disambiguation request {}: selected column {}",
            response.request_id,
            candidate.column_letter
        );
        let request = pending
            .remove(&response.request_id)
            .ok_or(MappingError::RequestNotFound(response.request_id))?;
        Ok((request, candidate))
    }

    /// An unsaved mapping for the chosen candidate, stamped with how it was chosen.
    pub fn build_mapping_from_resolution(
        &self,
        request: &DisambiguationRequest,
        response: &DisambiguationResponse,
        candidate: &ColumnCandidate,
        now: DateTime<Utc>,
    ) -> ColumnMapping {
        ColumnMapping {
            disambiguation_context: Some(DisambiguationContext {
                disambiguated_at: now,
                selected_index: response.selected_column_index,
                user_label: response.user_label.clone(),
                total_candidates: request.candidates.len(),
            }),
            ..ColumnMapping::from_candidate(
                &request.spreadsheet_id,
                &request.sheet_name,
                &request.header_text,
                candidate,
                now,
            )
        }
    }

    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Utc::now())
    }

    pub fn cleanup_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut pending = self.lock();
        let before = pending.len();
        pending.retain(|_, request| now.signed_duration_since(request.created_at) <= self.ttl);
        let removed = before - pending.len();
        if removed > 0 {
            log::info!("cleaned up {removed} expired disambiguation requests");
        }
        removed
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Snapshot of every pending request, oldest first.
    pub fn pending_requests(&self) -> Vec<DisambiguationRequest> {
        let mut requests: Vec<_> = self.lock().values().cloned().collect();
        requests.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.request_id.cmp(&b.request_id))
        });
        requests
    }

    fn is_expired(&self, request: &DisambiguationRequest, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(request.created_at) > self.ttl
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, DisambiguationRequest>> {
        self.pending.lock().expect("disambiguation mutex poisoned")
    }
}

impl Default for DisambiguationHandler {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}
