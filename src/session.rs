use crate::models::{DashboardFields, ExtractedLink, PageFields};
use std::collections::HashMap;
use tokio::sync::RwLock;

// ── Drafts ─────────────────────────────────────────────────────────────────

/// Unsubmitted values of the dashboard-page form for one scraped ordinal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageDraft {
    pub dashboard: String,
    pub page_uid: String,
    pub fields: PageFields,
}

/// Suggested path for a page: campaign placeholders followed by the label
/// in lower snake case.
pub fn default_path(label: &str) -> String {
    format!(
        "/<campaign_type>_<advertiser>_<year>_{}",
        label.replace(' ', "_").to_lowercase()
    )
}

/// Form values prefilled from a scraped link.
pub fn suggested_fields(
    ordinal: u32,
    link: Option<&ExtractedLink>,
    report_id: Option<&str>,
) -> PageFields {
    let label = link.map(|l| l.label.as_str()).unwrap_or_default();
    PageFields {
        page_name: label.to_owned(),
        page_number: ordinal.to_string(),
        path: default_path(label),
        vis_name: label.to_owned(),
        vis_page_uid: link.map(|l| l.destination_id.clone()).unwrap_or_default(),
        vis_uid: report_id.unwrap_or_default().to_owned(),
        ..Default::default()
    }
}

// ── Session ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SessionState {
    report_url: String,
    manual_dashboard_uid: String,
    manual_page_uid: String,
    /// Typed dashboard values kept across an auto-id round trip.
    dashboard_draft: Option<DashboardFields>,
    /// Typed dropdown-folder values kept across an auto-id round trip.
    dropdown_draft: Option<PageFields>,
    manual_page_uids: HashMap<u32, String>,
    drafts: HashMap<u32, PageDraft>,
}

/// The operator's in-progress form state, owned by the application.
///
/// Drafts and generated ids are keyed by scraped page ordinal. Submitting a
/// dashboard or a dropdown folder clears everything; submitting a dashboard
/// page clears only that ordinal.
#[derive(Debug, Default)]
pub struct FormSession {
    state: RwLock<SessionState>,
}

impl FormSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn report_url(&self) -> String {
        self.state.read().await.report_url.clone()
    }

    /// Switch to another report. Drafts belong to the old report's pages
    /// and are dropped when the URL actually changes.
    pub async fn set_report_url(&self, url: &str) {
        let mut state = self.state.write().await;
        if state.report_url != url {
            state.report_url = url.to_owned();
            state.drafts.clear();
            state.manual_page_uids.clear();
        }
    }

    pub async fn manual_dashboard_uid(&self) -> String {
        self.state.read().await.manual_dashboard_uid.clone()
    }

    pub async fn set_manual_dashboard_uid(&self, uid: String) {
        self.state.write().await.manual_dashboard_uid = uid;
    }

    pub async fn dashboard_draft(&self) -> Option<DashboardFields> {
        self.state.read().await.dashboard_draft.clone()
    }

    pub async fn save_dashboard_draft(&self, fields: DashboardFields) {
        self.state.write().await.dashboard_draft = Some(fields);
    }

    /// Manual page uid for the dropdown flow (`None`) or one ordinal.
    pub async fn manual_page_uid(&self, ordinal: Option<u32>) -> String {
        let state = self.state.read().await;
        match ordinal {
            None => state.manual_page_uid.clone(),
            Some(n) => state.manual_page_uids.get(&n).cloned().unwrap_or_default(),
        }
    }

    pub async fn set_manual_page_uid(&self, ordinal: Option<u32>, uid: String) {
        let mut state = self.state.write().await;
        match ordinal {
            None => state.manual_page_uid = uid,
            Some(n) => {
                state.manual_page_uids.insert(n, uid);
            }
        }
    }

    pub async fn dropdown_draft(&self) -> Option<PageFields> {
        self.state.read().await.dropdown_draft.clone()
    }

    pub async fn save_dropdown_draft(&self, fields: PageFields) {
        self.state.write().await.dropdown_draft = Some(fields);
    }

    pub async fn draft(&self, ordinal: u32) -> Option<PageDraft> {
        self.state.read().await.drafts.get(&ordinal).cloned()
    }

    pub async fn save_draft(&self, ordinal: u32, draft: PageDraft) {
        self.state.write().await.drafts.insert(ordinal, draft);
    }

    /// Forget the draft and generated id of one submitted page.
    pub async fn clear_page(&self, ordinal: u32) {
        let mut state = self.state.write().await;
        state.drafts.remove(&ordinal);
        state.manual_page_uids.remove(&ordinal);
    }

    /// Forget all form values. The report URL is kept.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        let report_url = std::mem::take(&mut state.report_url);
        *state = SessionState {
            report_url,
            ..Default::default()
        };
    }
}
