use crate::{
    models::{DashboardDocument, DashboardFields, FieldError, PageDocument, PageFields},
    store::DocumentStore,
};

pub const DASHBOARDS: &str = "dashboards";

#[derive(Debug, thiserror::Error)]
pub enum UpsertError {
    #[error("{0} must not be empty")]
    MissingId(&'static str),
    #[error("{0} must not contain '/'")]
    InvalidId(&'static str),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error("document store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Collection holding the pages of one dashboard.
pub fn pages_collection(dashboard_uid: &str) -> String {
    format!("{DASHBOARDS}/{dashboard_uid}/pages")
}

fn check_id(label: &'static str, id: &str) -> Result<(), UpsertError> {
    if id.is_empty() {
        return Err(UpsertError::MissingId(label));
    }
    if id.contains('/') {
        return Err(UpsertError::InvalidId(label));
    }
    Ok(())
}

/// First 20 characters of a random v4 UUID. Collisions are not checked.
pub fn generate_uid() -> String {
    uuid::Uuid::new_v4().to_string().chars().take(20).collect()
}

// ── Writes ─────────────────────────────────────────────────────────────────

/// Replace the dashboard document at `dashboards/{uid}`.
pub async fn upsert_dashboard(
    store: &dyn DocumentStore,
    uid: &str,
    fields: &DashboardFields,
) -> Result<DashboardDocument, UpsertError> {
    check_id("dashboardUid", uid)?;
    let doc = DashboardDocument::from_fields(uid, fields)?;

    store
        .set(DASHBOARDS, uid, &serde_json::to_value(&doc).map_err(anyhow::Error::from)?)
        .await?;

    tracing::info!("Dashboard '{}' written", uid);
    Ok(doc)
}

/// Replace the page document at `dashboards/{dashboard_uid}/pages/{page_uid}`.
///
/// The parent dashboard document is neither read nor created.
pub async fn upsert_page(
    store: &dyn DocumentStore,
    dashboard_uid: &str,
    page_uid: &str,
    fields: &PageFields,
) -> Result<PageDocument, UpsertError> {
    check_id("dashboardUid", dashboard_uid)?;
    check_id("pageUid", page_uid)?;
    let doc = PageDocument::from_fields(page_uid, fields)?;

    store
        .set(
            &pages_collection(dashboard_uid),
            page_uid,
            &serde_json::to_value(&doc).map_err(anyhow::Error::from)?,
        )
        .await?;

    tracing::info!("Page '{}' written under dashboard '{}'", page_uid, dashboard_uid);
    Ok(doc)
}

// ── Reads ──────────────────────────────────────────────────────────────────

pub async fn list_dashboards(store: &dyn DocumentStore) -> anyhow::Result<Vec<String>> {
    store.list_ids(DASHBOARDS).await
}

/// Every page under a dashboard. Documents that do not have the page shape
/// are skipped with a warning rather than failing the whole listing.
pub async fn list_pages(
    store: &dyn DocumentStore,
    dashboard_uid: &str,
) -> anyhow::Result<Vec<(String, PageDocument)>> {
    let docs = store.stream(&pages_collection(dashboard_uid)).await?;

    Ok(docs
        .into_iter()
        .filter_map(|(id, body)| match serde_json::from_value(body) {
            Ok(page) => Some((id, page)),
            Err(e) => {
                tracing::warn!("Skipping malformed page '{}' in '{}': {}", id, dashboard_uid, e);
                None
            }
        })
        .collect())
}

// ── Parent selection ───────────────────────────────────────────────────────

/// Parent options for a dropdown folder: the empty root option followed by
/// the `pageUid` of every page.
pub fn parent_candidates(pages: &[(String, PageDocument)]) -> Vec<String> {
    std::iter::once(String::new())
        .chain(pages.iter().map(|(_, p)| p.page_uid.clone().unwrap_or_default()))
        .collect()
}

/// Parent options for a dashboard page at `depth`: the empty root option
/// followed by every page whose depth lies in `0..depth`.
pub fn depth_eligible_parents(pages: &[(String, PageDocument)], depth: i64) -> Vec<String> {
    std::iter::once(String::new())
        .chain(
            pages
                .iter()
                .filter(|(_, p)| (0..depth).contains(&p.depth))
                .map(|(_, p)| p.page_uid.clone().unwrap_or_default()),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use serde_json::json;

    fn page(uid: &str, depth: i64) -> (String, PageDocument) {
        let fields = PageFields {
            depth: depth.to_string(),
            ..Default::default()
        };
        (uid.to_owned(), PageDocument::from_fields(uid, &fields).unwrap())
    }

    #[tokio::test]
    async fn dashboard_upsert_is_idempotent() {
        let store = SqliteStore::in_memory().await.unwrap();
        let fields = DashboardFields {
            dashboard_name: "Home".into(),
            dashboard_number: "1".into(),
        };

        upsert_dashboard(&store, "d1", &fields).await.unwrap();
        upsert_dashboard(&store, "d1", &fields).await.unwrap();

        assert_eq!(list_dashboards(&store).await.unwrap(), vec!["d1"]);
        assert_eq!(
            store.get(DASHBOARDS, "d1").await.unwrap(),
            Some(json!({ "dashboardName": "Home", "dashboardNumber": 1, "dashboardUid": "d1" }))
        );
    }

    #[tokio::test]
    async fn resubmission_replaces_rather_than_merges() {
        let store = SqliteStore::in_memory().await.unwrap();
        let first = PageFields {
            advertiser: "Acme".into(),
            icon_name: "home".into(),
            ..Default::default()
        };
        let second = PageFields {
            advertiser: String::new(),
            ..Default::default()
        };

        upsert_page(&store, "d1", "p1", &first).await.unwrap();
        upsert_page(&store, "d1", "p1", &second).await.unwrap();

        let stored = store.get(&pages_collection("d1"), "p1").await.unwrap().unwrap();
        assert_eq!(stored["advertiser"], json!(null));
        assert_eq!(stored["iconName"], json!(null));
    }

    #[tokio::test]
    async fn page_under_missing_dashboard_creates_no_dashboard() {
        let store = SqliteStore::in_memory().await.unwrap();
        upsert_page(&store, "ghost", "p1", &PageFields::default())
            .await
            .unwrap();

        assert!(list_dashboards(&store).await.unwrap().is_empty());
        let pages = list_pages(&store, "ghost").await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].1.visualizations.len(), 1);
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_store() {
        let store = SqliteStore::in_memory().await.unwrap();
        let bad_number = DashboardFields {
            dashboard_name: "x".into(),
            dashboard_number: "lots".into(),
        };

        assert!(matches!(
            upsert_dashboard(&store, "", &DashboardFields::default()).await,
            Err(UpsertError::MissingId("dashboardUid"))
        ));
        assert!(matches!(
            upsert_page(&store, "d1", "a/b", &PageFields::default()).await,
            Err(UpsertError::InvalidId("pageUid"))
        ));
        assert!(matches!(
            upsert_dashboard(&store, "d1", &bad_number).await,
            Err(UpsertError::Field(_))
        ));
        assert!(list_dashboards(&store).await.unwrap().is_empty());
    }

    #[test]
    fn depth_filter_keeps_strictly_shallower_pages() {
        let pages = vec![page("root", 0), page("mid", 1), page("deep", 2)];

        assert_eq!(depth_eligible_parents(&pages, 0), vec![""]);
        assert_eq!(depth_eligible_parents(&pages, 2), vec!["", "root", "mid"]);
        assert_eq!(parent_candidates(&pages), vec!["", "root", "mid", "deep"]);
    }

    #[test]
    fn generated_uids_are_twenty_chars() {
        let a = generate_uid();
        assert_eq!(a.len(), 20);
        assert_ne!(a, generate_uid());
    }
}
