use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest is not well-formed XML: {source}")]
    Xml {
        #[from]
        source: quick_xml::Error,
    },

    #[error("manifest is not well-formed XML: {reason}")]
    NotWellFormed { reason: String },

    #[error("required element `{element}` is missing")]
    MissingElement { element: &'static str },

    #[error("required attribute `{attribute}` is missing on `{element}`")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("field `{field}` has an unparsable value `{value}`")]
    InvalidNumber { field: &'static str, value: String },

    #[error("field `{field}` must be a positive, finite number of seconds, got `{value}`")]
    InvalidDuration { field: &'static str, value: String },
}

impl ManifestError {
    pub fn not_well_formed(reason: impl Into<String>) -> Self {
        Self::NotWellFormed {
            reason: reason.into(),
        }
    }

    pub fn missing_attribute(element: &'static str, attribute: &'static str) -> Self {
        Self::MissingAttribute { element, attribute }
    }

    pub fn invalid_number(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidNumber {
            field,
            value: value.into(),
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for ManifestError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        ManifestError::Xml {
            source: quick_xml::Error::InvalidAttr(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unterminated `$` identifier in template `{template}`")]
    Unterminated { template: String },

    #[error("unsupported template identifier `${identifier}$`")]
    UnsupportedIdentifier { identifier: String },

    #[error("invalid format tag in template identifier `${identifier}$`")]
    InvalidFormat { identifier: String },

    #[error("template `{template}` uses `$Number$` but no segment number applies")]
    NumberUnavailable { template: String },
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("template expansion failed: {0}")]
    Template(#[from] TemplateError),

    #[error("two segments map to the same local path `{}`", path.display())]
    DuplicatePath { path: PathBuf },

    #[error("manifest describes {count} segments, more than the supported maximum")]
    TooManySegments { count: u64 },
}
