use crate::{
    extract, hierarchy,
    models::{coerce_count, DashboardFields, ExtractedLink, PageFields},
    session::{suggested_fields, PageDraft},
    AppState,
};
use askama::Template;
use axum::{
    extract::{Form, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{
    cookie::{Cookie, SameSite},
    CookieJar,
};
use serde::Deserialize;
use std::sync::Arc;

/// Select value meaning "type or generate a new uid".
const NEW_UID: &str = "__new__";

// ── Flows ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Top-level dashboard documents.
    Navigation,
    /// Pages entered entirely by hand.
    Dropdown,
    /// Pages prefilled from the scraped report.
    Pages,
}

impl Mode {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("dropdown") => Mode::Dropdown,
            Some("pages") => Mode::Pages,
            _ => Mode::Navigation,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Mode::Navigation => "navigation",
            Mode::Dropdown => "dropdown",
            Mode::Pages => "pages",
        }
    }
}

// ── Template structs ───────────────────────────────────────────────────────

/// One `<option>` of a select box.
struct Choice {
    value: String,
    label: String,
    selected: bool,
}

fn choices(values: impl IntoIterator<Item = String>, selected: &str) -> Vec<Choice> {
    values
        .into_iter()
        .map(|value| Choice {
            label: if value.is_empty() {
                "(none)".to_owned()
            } else {
                value.clone()
            },
            selected: value == selected,
            value,
        })
        .collect()
}

/// Existing uids behind a "create new" entry.
fn uid_choices(existing: Vec<String>, selected: &str, create_label: &str) -> Vec<Choice> {
    let mut out = vec![Choice {
        value: NEW_UID.to_owned(),
        label: create_label.to_owned(),
        selected: selected == NEW_UID,
    }];
    out.extend(choices(existing, selected));
    out
}

#[derive(Template)]
#[template(path = "admin.html")]
struct AdminTemplate {
    mode: &'static str,
    report_url: String,
    report_id: String,
    links: Vec<ExtractedLink>,
    flash_success: Option<String>,
    flash_error: Option<String>,
    has_dashboards: bool,
    dashboards: Vec<Choice>,
    dashboard_uids: Vec<Choice>,
    dashboard_fields: DashboardFields,
    manual_dashboard_uid: String,
    page_uids: Vec<Choice>,
    manual_page_uid: String,
    parents: Vec<Choice>,
    ordinals: Vec<Choice>,
    ordinal: u32,
    fields: PageFields,
}

// ── Form types ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AdminQuery {
    mode: Option<String>,
    dashboard: Option<String>,
    depth: Option<String>,
    page: Option<String>,
}

#[derive(Deserialize)]
pub struct ReportForm {
    #[serde(default)]
    report_url: String,
    #[serde(default)]
    mode: String,
}

#[derive(Deserialize)]
pub struct DashboardForm {
    action: String,
    #[serde(default)]
    dashboard_uid_choice: String,
    #[serde(default)]
    new_dashboard_uid: String,
    #[serde(flatten)]
    fields: DashboardFields,
}

/// Shared by the dropdown-folder and dashboard-page flows. Every value is a
/// string: flattened urlencoded forms cannot carry typed fields.
#[derive(Deserialize)]
pub struct PageForm {
    action: String,
    #[serde(default)]
    dashboard: String,
    #[serde(default)]
    ordinal: String,
    #[serde(default)]
    next_page: String,
    #[serde(default)]
    page_uid_choice: String,
    #[serde(default)]
    new_page_uid: String,
    #[serde(flatten)]
    fields: PageFields,
}

impl PageForm {
    fn page_uid(&self) -> String {
        resolve_uid(&self.page_uid_choice, &self.new_page_uid)
    }
}

/// The uid picked from a select, or the typed one when "create new" (or
/// nothing) was picked.
fn resolve_uid(choice: &str, typed: &str) -> String {
    if choice.is_empty() || choice == NEW_UID {
        typed.trim().to_owned()
    } else {
        choice.to_owned()
    }
}

fn admin_url(mode: Mode, dashboard: &str, depth: &str, page: Option<u32>) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("mode", mode.as_str());
    if !dashboard.is_empty() {
        query.append_pair("dashboard", dashboard);
    }
    if !depth.is_empty() {
        query.append_pair("depth", depth);
    }
    if let Some(n) = page {
        query.append_pair("page", &n.to_string());
    }
    format!("/admin?{}", query.finish())
}

// ── Page ───────────────────────────────────────────────────────────────────

/// GET /admin
pub async fn admin_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
    jar: CookieJar,
) -> Response {
    // Read and clear flash cookies
    let flash_success = jar.get("flash_success").map(|c| c.value().to_owned());
    let flash_error = jar.get("flash_error").map(|c| c.value().to_owned());

    let clear_success = Cookie::build(("flash_success", ""))
        .path("/")
        .max_age(time::Duration::seconds(0))
        .build();
    let clear_error = Cookie::build(("flash_error", ""))
        .path("/")
        .max_age(time::Duration::seconds(0))
        .build();

    let mode = Mode::parse(query.mode.as_deref());
    let report_url = state.session.report_url().await;
    let links = state.extractor.extract_cached(&report_url).await;
    let report_id = extract::report_id(&report_url);

    let dashboard_ids = match hierarchy::list_dashboards(state.store.as_ref()).await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!("Failed to load dashboards: {:?}", e);
            return (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load dashboards",
            )
                .into_response();
        }
    };

    // Dashboard-page state is per scraped ordinal.
    let ordinal = query
        .page
        .as_deref()
        .and_then(|p| p.trim().parse::<u32>().ok())
        .or_else(|| links.first().map(|l| l.ordinal))
        .unwrap_or(1);
    let draft = match mode {
        Mode::Pages => state.session.draft(ordinal).await,
        _ => None,
    };

    let dashboard = query
        .dashboard
        .clone()
        .filter(|d| !d.is_empty())
        .or_else(|| draft.as_ref().map(|d| d.dashboard.clone()))
        .unwrap_or_default();

    let pages = if dashboard.is_empty() || mode == Mode::Navigation {
        Vec::new()
    } else {
        match hierarchy::list_pages(state.store.as_ref(), &dashboard).await {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("Failed to load pages of '{}': {:?}", dashboard, e);
                return (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to load pages",
                )
                    .into_response();
            }
        }
    };
    let existing_page_uids: Vec<String> = pages.iter().map(|(id, _)| id.clone()).collect();

    let (fields, selected_page_uid, parents, manual_page_uid) = match mode {
        Mode::Navigation => (PageFields::default(), String::new(), Vec::new(), String::new()),
        Mode::Dropdown => {
            let mut fields = state.session.dropdown_draft().await.unwrap_or_default();
            if let Some(depth) = &query.depth {
                fields.depth = depth.clone();
            }
            let parents = choices(hierarchy::parent_candidates(&pages), &fields.parent_uid);
            let manual = state.session.manual_page_uid(None).await;
            let selected = if manual.is_empty() { String::new() } else { NEW_UID.to_owned() };
            (fields, selected, parents, manual)
        }
        Mode::Pages => {
            let (mut fields, selected) = match draft {
                Some(d) => (d.fields, d.page_uid),
                None => {
                    let link = links.iter().find(|l| l.ordinal == ordinal);
                    (suggested_fields(ordinal, link, report_id.as_deref()), String::new())
                }
            };
            if let Some(depth) = &query.depth {
                fields.depth = depth.clone();
            }
            let depth = coerce_count("depth", &fields.depth).unwrap_or(0);
            let parents = choices(
                hierarchy::depth_eligible_parents(&pages, depth),
                &fields.parent_uid,
            );
            let manual = state.session.manual_page_uid(Some(ordinal)).await;
            let selected = if selected.is_empty() && !manual.is_empty() {
                NEW_UID.to_owned()
            } else {
                selected
            };
            (fields, selected, parents, manual)
        }
    };

    let manual_dashboard_uid = state.session.manual_dashboard_uid().await;
    let dashboard_uid_selected = if manual_dashboard_uid.is_empty() {
        String::new()
    } else {
        NEW_UID.to_owned()
    };

    let tmpl = AdminTemplate {
        mode: mode.as_str(),
        report_url,
        report_id: report_id.unwrap_or_default(),
        ordinals: choices(
            links.iter().map(|l| l.ordinal.to_string()),
            &ordinal.to_string(),
        ),
        links,
        flash_success,
        flash_error,
        has_dashboards: !dashboard_ids.is_empty(),
        dashboards: choices(dashboard_ids.iter().cloned(), &dashboard),
        dashboard_uids: uid_choices(dashboard_ids, &dashboard_uid_selected, "Create DashboardUid"),
        dashboard_fields: state.session.dashboard_draft().await.unwrap_or_default(),
        manual_dashboard_uid,
        page_uids: uid_choices(existing_page_uids, &selected_page_uid, "Create PageUid"),
        manual_page_uid,
        parents,
        ordinal,
        fields,
    };

    (jar.remove(clear_success).remove(clear_error), tmpl).into_response()
}

// ── Report ─────────────────────────────────────────────────────────────────

/// POST /admin/report
pub async fn set_report(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ReportForm>,
) -> Redirect {
    state.session.set_report_url(form.report_url.trim()).await;
    Redirect::to(&admin_url(Mode::parse(Some(&form.mode)), "", "", None))
}

/// POST /admin/report/refresh
pub async fn refresh_report(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ReportForm>,
) -> Redirect {
    let url = state.session.report_url().await;
    state.extractor.forget(&url);
    tracing::info!("Discarded cached links for {}", url);
    Redirect::to(&admin_url(Mode::parse(Some(&form.mode)), "", "", None))
}

// ── Navigation documents ───────────────────────────────────────────────────

/// POST /admin/dashboards
pub async fn create_dashboard(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<DashboardForm>,
) -> Response {
    let back = admin_url(Mode::Navigation, "", "", None);

    if form.action == "generate" {
        let uid = hierarchy::generate_uid();
        state.session.set_manual_dashboard_uid(uid.clone()).await;
        state.session.save_dashboard_draft(form.fields).await;
        return set_flash_and_redirect(jar, Some(&format!("Generated UID {uid}")), None, &back);
    }

    let uid = resolve_uid(&form.dashboard_uid_choice, &form.new_dashboard_uid);
    match hierarchy::upsert_dashboard(state.store.as_ref(), &uid, &form.fields).await {
        Ok(_) => {
            state.session.clear().await;
            set_flash_and_redirect(
                jar,
                Some(&format!(
                    "Top-level page '{}' added!",
                    form.fields.dashboard_name
                )),
                None,
                &back,
            )
        }
        Err(e) => {
            tracing::error!("Failed to write dashboard '{}': {}", uid, e);
            state.session.save_dashboard_draft(form.fields).await;
            set_flash_and_redirect(jar, None, Some(&e.to_string()), &back)
        }
    }
}

// ── Dropdown folders ───────────────────────────────────────────────────────

/// POST /admin/pages
pub async fn create_dropdown_page(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<PageForm>,
) -> Response {
    let back = admin_url(Mode::Dropdown, &form.dashboard, "", None);

    match form.action.as_str() {
        "create" => {}
        "generate" => {
            let uid = hierarchy::generate_uid();
            state.session.set_manual_page_uid(None, uid.clone()).await;
            state.session.save_dropdown_draft(form.fields).await;
            return set_flash_and_redirect(jar, Some(&format!("Generated UID {uid}")), None, &back);
        }
        _ => {
            // Reload with the chosen dashboard, keeping what was typed.
            state.session.save_dropdown_draft(form.fields).await;
            return Redirect::to(&back).into_response();
        }
    }

    let page_uid = form.page_uid();
    match hierarchy::upsert_page(state.store.as_ref(), &form.dashboard, &page_uid, &form.fields)
        .await
    {
        Ok(_) => {
            state.session.clear().await;
            set_flash_and_redirect(
                jar,
                Some(&format!(
                    "New page '{}' added under '{}'!",
                    form.fields.page_name, form.dashboard
                )),
                None,
                &back,
            )
        }
        Err(e) => {
            tracing::error!("Failed to write page '{}': {}", page_uid, e);
            state.session.save_dropdown_draft(form.fields).await;
            set_flash_and_redirect(jar, None, Some(&e.to_string()), &back)
        }
    }
}

// ── Dashboard pages ────────────────────────────────────────────────────────

/// POST /admin/dashboard-pages
pub async fn create_dashboard_page(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<PageForm>,
) -> Response {
    let ordinal = form.ordinal.trim().parse::<u32>().unwrap_or(1);

    if form.action == "create" {
        let back = admin_url(Mode::Pages, &form.dashboard, "", Some(ordinal));
        let page_uid = form.page_uid();
        return match hierarchy::upsert_page(
            state.store.as_ref(),
            &form.dashboard,
            &page_uid,
            &form.fields,
        )
        .await
        {
            Ok(_) => {
                state.session.clear_page(ordinal).await;
                set_flash_and_redirect(
                    jar,
                    Some(&format!(
                        "Sub-page '{}' added under '{}'!",
                        form.fields.page_name, form.dashboard
                    )),
                    None,
                    &back,
                )
            }
            Err(e) => {
                tracing::error!("Failed to write page '{}': {}", page_uid, e);
                save_page_draft(&state, ordinal, &form).await;
                set_flash_and_redirect(jar, None, Some(&e.to_string()), &back)
            }
        };
    }

    save_page_draft(&state, ordinal, &form).await;

    if form.action == "generate" {
        let uid = hierarchy::generate_uid();
        state.session.set_manual_page_uid(Some(ordinal), uid.clone()).await;
        let mut draft = state.session.draft(ordinal).await.unwrap_or_default();
        draft.page_uid = NEW_UID.to_owned();
        state.session.save_draft(ordinal, draft).await;
        let back = admin_url(Mode::Pages, &form.dashboard, &form.fields.depth, Some(ordinal));
        return set_flash_and_redirect(jar, Some(&format!("Generated UID {uid}")), None, &back);
    }

    // "save" and "load": keep this page's values as its draft, then switch to
    // the selected scraped page or reload this one for a new dashboard/depth.
    let next = form.next_page.trim().parse::<u32>().unwrap_or(ordinal);
    let depth = if next == ordinal { form.fields.depth.as_str() } else { "" };
    Redirect::to(&admin_url(Mode::Pages, &form.dashboard, depth, Some(next))).into_response()
}

async fn save_page_draft(state: &AppState, ordinal: u32, form: &PageForm) {
    if form.page_uid_choice == NEW_UID {
        state
            .session
            .set_manual_page_uid(Some(ordinal), form.new_page_uid.trim().to_owned())
            .await;
    }
    state
        .session
        .save_draft(
            ordinal,
            PageDraft {
                dashboard: form.dashboard.clone(),
                page_uid: form.page_uid_choice.clone(),
                fields: form.fields.clone(),
            },
        )
        .await;
}

// ── Private helpers ────────────────────────────────────────────────────────

/// Set a flash cookie and redirect to the given path.
fn set_flash_and_redirect(
    jar: CookieJar,
    success: Option<&str>,
    error: Option<&str>,
    destination: &str,
) -> Response {
    let mut jar = jar;

    for (name, msg) in [("flash_success", success), ("flash_error", error)] {
        if let Some(msg) = msg {
            let c = Cookie::build((name, msg.to_owned()))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .max_age(time::Duration::seconds(30))
                .build();
            jar = jar.add(c);
        }
    }

    (jar, Redirect::to(destination)).into_response()
}
