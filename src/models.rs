use serde::{Deserialize, Serialize};

// ── Stored documents ───────────────────────────────────────────────────────

/// A top-level navigation document stored at `dashboards/{uid}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardDocument {
    pub dashboard_name: Option<String>,
    pub dashboard_number: i64,
    pub dashboard_uid: Option<String>,
}

/// A navigable page stored at `dashboards/{dashboard}/pages/{uid}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDocument {
    pub advertiser: Option<String>,
    pub depth: i64,
    pub icon_name: Option<String>,
    pub page_name: Option<String>,
    pub page_number: i64,
    pub page_uid: Option<String>,
    pub parent: Option<String>,
    pub path: Option<String>,
    #[serde(default)]
    pub visualizations: Vec<Visualization>,
}

/// Embedded reference to the view a page renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visualization {
    pub vis_name: Option<String>,
    pub vis_page_uid: Option<String>,
    pub vis_uid: Option<String>,
}

/// One navigation control scraped from a rendered report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedLink {
    pub ordinal: u32,
    pub label: String,
    pub destination_id: String,
}

// ── Raw form input ─────────────────────────────────────────────────────────

/// Dashboard fields exactly as the operator typed them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardFields {
    #[serde(default)]
    pub dashboard_name: String,
    #[serde(default)]
    pub dashboard_number: String,
}

/// Page fields exactly as the operator typed them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFields {
    #[serde(default)]
    pub advertiser: String,
    #[serde(default)]
    pub depth: String,
    #[serde(default)]
    pub icon_name: String,
    #[serde(default)]
    pub page_name: String,
    #[serde(default)]
    pub page_number: String,
    #[serde(default)]
    pub parent_uid: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub vis_name: String,
    #[serde(default)]
    pub vis_page_uid: String,
    #[serde(default)]
    pub vis_uid: String,
}

// ── Normalization ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("{field} must be a whole number, got '{value}'")]
    NotANumber { field: &'static str, value: String },
    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: i64 },
}

/// Map an empty string to the absence marker. Whitespace is kept as typed.
pub fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_owned())
    }
}

/// Coerce a numeric form field to a non-negative integer.
///
/// Blank input counts as `0` and decimal input is truncated toward zero,
/// matching what a number widget would submit.
pub fn coerce_count(field: &'static str, value: &str) -> Result<i64, FieldError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }

    let number = match trimmed.parse::<i64>() {
        Ok(n) => n,
        Err(_) => match trimmed.parse::<f64>() {
            Ok(f) if f.is_finite() => f.trunc() as i64,
            _ => {
                return Err(FieldError::NotANumber {
                    field,
                    value: trimmed.to_owned(),
                })
            }
        },
    };

    if number < 0 {
        return Err(FieldError::Negative {
            field,
            value: number,
        });
    }
    Ok(number)
}

impl DashboardDocument {
    pub fn from_fields(uid: &str, fields: &DashboardFields) -> Result<Self, FieldError> {
        Ok(Self {
            dashboard_name: non_empty(&fields.dashboard_name),
            dashboard_number: coerce_count("dashboardNumber", &fields.dashboard_number)?,
            dashboard_uid: non_empty(uid),
        })
    }
}

impl PageDocument {
    /// Build the stored page. The visualization is always written as a
    /// single-element list.
    pub fn from_fields(uid: &str, fields: &PageFields) -> Result<Self, FieldError> {
        Ok(Self {
            advertiser: non_empty(&fields.advertiser),
            depth: coerce_count("depth", &fields.depth)?,
            icon_name: non_empty(&fields.icon_name),
            page_name: non_empty(&fields.page_name),
            page_number: coerce_count("pageNumber", &fields.page_number)?,
            page_uid: non_empty(uid),
            parent: non_empty(&fields.parent_uid),
            path: non_empty(&fields.path),
            visualizations: vec![Visualization {
                vis_name: non_empty(&fields.vis_name),
                vis_page_uid: non_empty(&fields.vis_page_uid),
                vis_uid: non_empty(&fields.vis_uid),
            }],
        })
    }
}
