//! The workshop payload every analysis engine consumes.
//!
//! A workshop has four required sections. Three of them point at a parent
//! section by id, which gives the structural links the scoring functions
//! check:
//!
//! ```text
//!   business_values ◄── essential_assets ◄── supporting_assets
//!         ▲
//!         └────────── dreaded_events
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::InvalidInput;

/// One of the four required workshop sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    BusinessValues,
    EssentialAssets,
    SupportingAssets,
    DreadedEvents,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::BusinessValues,
        Section::EssentialAssets,
        Section::SupportingAssets,
        Section::DreadedEvents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BusinessValues => "business_values",
            Self::EssentialAssets => "essential_assets",
            Self::SupportingAssets => "supporting_assets",
            Self::DreadedEvents => "dreaded_events",
        }
    }

    /// The section this one references, if any.
    pub fn parent(&self) -> Option<Section> {
        match self {
            Self::BusinessValues => None,
            Self::EssentialAssets => Some(Self::BusinessValues),
            Self::SupportingAssets => Some(Self::EssentialAssets),
            Self::DreadedEvents => Some(Self::BusinessValues),
        }
    }

    /// The parent id an item of this section declares.
    pub fn parent_ref<'a>(&self, item: &'a WorkshopItem) -> Option<&'a str> {
        match self {
            Self::BusinessValues => None,
            Self::EssentialAssets | Self::DreadedEvents => item.business_value_id.as_deref(),
            Self::SupportingAssets => item.essential_asset_id.as_deref(),
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single element of a workshop section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkshopItem {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Parent business value (essential assets, dreaded events)
    #[serde(
        default,
        alias = "businessValueId",
        skip_serializing_if = "Option::is_none"
    )]
    pub business_value_id: Option<String>,

    /// Parent essential asset (supporting assets)
    #[serde(
        default,
        alias = "essentialAssetId",
        skip_serializing_if = "Option::is_none"
    )]
    pub essential_asset_id: Option<String>,
}

impl WorkshopItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_business_value(mut self, id: impl Into<String>) -> Self {
        self.business_value_id = Some(id.into());
        self
    }

    pub fn with_essential_asset(mut self, id: impl Into<String>) -> Self {
        self.essential_asset_id = Some(id.into());
        self
    }

    /// Name and description joined, for text-based engines.
    pub fn text(&self) -> String {
        match (self.name.trim(), self.description.trim()) {
            ("", d) => d.to_string(),
            (n, "") => n.to_string(),
            (n, d) => format!("{n} {d}"),
        }
    }

    /// Description length in characters.
    pub fn description_len(&self) -> usize {
        self.description.trim().chars().count()
    }
}

/// The full workshop payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkshopData {
    #[serde(default, alias = "businessValues")]
    pub business_values: Vec<WorkshopItem>,

    #[serde(default, alias = "essentialAssets")]
    pub essential_assets: Vec<WorkshopItem>,

    #[serde(default, alias = "supportingAssets")]
    pub supporting_assets: Vec<WorkshopItem>,

    #[serde(default, alias = "dreadedEvents")]
    pub dreaded_events: Vec<WorkshopItem>,

    #[serde(default, alias = "currentStep", skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
}

impl WorkshopData {
    /// Parse a payload, reporting shape errors as invalid input.
    pub fn from_json(value: serde_json::Value) -> Result<Self, InvalidInput> {
        serde_json::from_value(value).map_err(|e| InvalidInput::Malformed(e.to_string()))
    }

    pub fn section(&self, section: Section) -> &[WorkshopItem] {
        match section {
            Section::BusinessValues => &self.business_values,
            Section::EssentialAssets => &self.essential_assets,
            Section::SupportingAssets => &self.supporting_assets,
            Section::DreadedEvents => &self.dreaded_events,
        }
    }

    /// Every item, tagged with its section, in section order.
    pub fn items(&self) -> impl Iterator<Item = (Section, &WorkshopItem)> {
        Section::ALL
            .into_iter()
            .flat_map(move |s| self.section(s).iter().map(move |item| (s, item)))
    }

    pub fn total_items(&self) -> usize {
        Section::ALL.iter().map(|s| self.section(*s).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_items() == 0
    }

    /// Ids of one section, for link resolution.
    pub fn ids(&self, section: Section) -> HashSet<&str> {
        self.section(section).iter().map(|i| i.id.as_str()).collect()
    }

    /// Reject items with empty ids or ids repeated within a section.
    pub fn validate(&self) -> Result<(), InvalidInput> {
        for section in Section::ALL {
            let mut seen = HashSet::new();
            for item in self.section(section) {
                let id = item.id.trim();
                if id.is_empty() {
                    return Err(InvalidInput::EmptyId(section.as_str()));
                }
                if !seen.insert(id) {
                    return Err(InvalidInput::DuplicateId {
                        section: section.as_str(),
                        id: id.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
