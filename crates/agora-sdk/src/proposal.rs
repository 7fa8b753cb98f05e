//! Proposals

use crate::error::{Result, SdkError};
use crate::traits::VersionedContent;
use agora_client::sheets::{Budget, Description, Title};
use agora_client::{content_types, Resource, Sheets};

/// Editable fields of a proposal. `budget` is only used in participatory
/// budgeting processes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProposalForm {
    pub title: String,
    pub short_description: String,
    pub description: String,
    pub budget: Option<u64>,
}

impl ProposalForm {
    /// Prefill from an existing proposal version
    pub fn from_version(version: &Resource) -> Result<Self> {
        let title: Title = version.data.require()?;
        let description = version.data.get::<Description>()?.unwrap_or_default();
        let budget = version.data.get::<Budget>()?.map(|b| b.budget);
        Ok(Self {
            title: title.title,
            short_description: description.short_description,
            description: description.description,
            budget,
        })
    }
}

impl VersionedContent for ProposalForm {
    fn item_type(&self) -> &str {
        content_types::PROPOSAL
    }

    fn version_type(&self) -> &str {
        content_types::PROPOSAL_VERSION
    }

    fn apply(&self, sheets: &mut Sheets) -> agora_client::Result<()> {
        sheets.set(&Title {
            title: self.title.clone(),
        })?;
        sheets.set(&Description {
            short_description: self.short_description.clone(),
            description: self.description.clone(),
        })?;
        if let Some(budget) = self.budget {
            sheets.set(&Budget { budget })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(SdkError::Validation("title is required".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_client::sheets::Rateable;

    #[test]
    fn test_apply_leaves_other_sheets() {
        let mut sheets = Sheets::new();
        sheets
            .set(&Rateable {
                post_pool: "/rates/".into(),
            })
            .unwrap();

        let form = ProposalForm {
            title: "Bike lanes".into(),
            short_description: "More of them".into(),
            budget: Some(12_000),
            ..Default::default()
        };
        form.apply(&mut sheets).unwrap();

        assert!(sheets.contains::<Rateable>());
        assert_eq!(sheets.require::<Budget>().unwrap().budget, 12_000);
        let version = Resource::new(content_types::PROPOSAL_VERSION);
        let version = Resource { data: sheets, ..version };
        assert_eq!(ProposalForm::from_version(&version).unwrap(), form);
    }

    #[test]
    fn test_title_required() {
        assert!(ProposalForm::default().validate().is_err());
    }
}
