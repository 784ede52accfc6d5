//! Generation request - the six fields a human fills in

use serde::{Deserialize, Serialize};

/// Free-form author and description metadata. Used verbatim in output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFields {
    pub description: String,
    pub author: String,
    pub email: String,
    pub homepage: String,
    pub role: String,
}

impl MetadataFields {
    /// `(field name, value)` pairs in form order.
    pub fn entries(&self) -> [(&'static str, &str); 5] {
        [
            ("description", &self.description),
            ("author", &self.author),
            ("email", &self.email),
            ("homepage", &self.homepage),
            ("role", &self.role),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// Untrusted module name as typed; sanitized before use.
    pub raw_name: String,
    #[serde(flatten)]
    pub fields: MetadataFields,
}

impl GenerationRequest {
    pub fn new(
        raw_name: impl Into<String>,
        description: impl Into<String>,
        author: impl Into<String>,
        email: impl Into<String>,
        homepage: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            raw_name: raw_name.into(),
            fields: MetadataFields {
                description: description.into(),
                author: author.into(),
                email: email.into(),
                homepage: homepage.into(),
                role: role.into(),
            },
        }
    }
}
