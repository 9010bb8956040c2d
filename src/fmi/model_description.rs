//! `modelDescription.xml` parsing for co-simulation artifacts.

use std::fs;
use std::path::Path;

use roxmltree::{Document, Node};

use crate::error::SlaveError;
use crate::fmi::Causality;

/// File name of the description inside an unpacked artifact.
pub const FILE_NAME: &str = "modelDescription.xml";

/// One scalar variable of an external model.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarVariable {
    pub name: String,
    pub value_reference: u32,
    pub causality: Causality,
}

/// Metadata of an unpacked artifact.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelDescription {
    /// Interface version the artifact was built against.
    pub fmi_version: String,
    pub model_name: String,
    /// Prefix of every exported function symbol.
    pub model_identifier: String,
    pub guid: String,
    pub variables: Vec<ScalarVariable>,
}

impl ModelDescription {
    /// Reads `modelDescription.xml` from an unpacked artifact directory.
    ///
    /// # Errors
    ///
    /// Returns [`SlaveError::ModelDescription`] if the file is missing or invalid.
    pub fn from_dir(dir: &Path) -> Result<Self, SlaveError> {
        let path = dir.join(FILE_NAME);
        let xml = fs::read_to_string(&path).map_err(|e| SlaveError::ModelDescription {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Self::parse(&xml).map_err(|reason| SlaveError::ModelDescription { path, reason })
    }

    /// Parses the XML text of a model description.
    ///
    /// # Errors
    ///
    /// Returns a description of the first structural problem found.
    pub fn parse(xml: &str) -> Result<Self, String> {
        let doc = Document::parse(xml).map_err(|e| e.to_string())?;
        let root = doc.root_element();
        if root.tag_name().name() != "fmiModelDescription" {
            return Err(format!(
                "root element is <{}>, expected <fmiModelDescription>",
                root.tag_name().name()
            ));
        }
        let required = |attr: &str| {
            root.attribute(attr)
                .map(str::to_string)
                .ok_or_else(|| format!("missing attribute \"{attr}\""))
        };

        let variables = root
            .descendants()
            .filter(|n| n.has_tag_name("ScalarVariable"))
            .map(parse_variable)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            fmi_version: required("fmiVersion")?,
            model_name: root.attribute("modelName").unwrap_or_default().to_string(),
            model_identifier: required("modelIdentifier")?,
            guid: required("guid")?,
            variables,
        })
    }

    /// Number of variables with the given causality.
    pub fn count(&self, causality: Causality) -> usize {
        self.variables
            .iter()
            .filter(|v| v.causality == causality)
            .count()
    }

    /// Value reference of the variable `name`, which must have `causality`.
    ///
    /// # Errors
    ///
    /// [`SlaveError::UnknownVariable`] if no variable is called `name`;
    /// [`SlaveError::WrongCausality`] if it exists with another causality.
    pub fn value_reference(&self, name: &str, causality: Causality) -> Result<u32, SlaveError> {
        let var = self
            .variables
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| SlaveError::UnknownVariable(name.to_string()))?;
        if var.causality != causality {
            return Err(SlaveError::WrongCausality {
                name: name.to_string(),
                expected: causality,
            });
        }
        Ok(var.value_reference)
    }
}

fn parse_variable(node: Node<'_, '_>) -> Result<ScalarVariable, String> {
    let name = node
        .attribute("name")
        .ok_or("ScalarVariable without \"name\"")?
        .to_string();
    let value_reference = node
        .attribute("valueReference")
        .ok_or_else(|| format!("variable \"{name}\" has no valueReference"))?
        .parse::<u32>()
        .map_err(|e| format!("variable \"{name}\": invalid valueReference: {e}"))?;
    let causality = Causality::from_attribute(node.attribute("causality").unwrap_or("internal"));
    Ok(ScalarVariable {
        name,
        value_reference,
        causality,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<fmiModelDescription fmiVersion="1.0" modelName="Room" modelIdentifier="Room"
    guid="{8c4e810f-3df3-4a00-8276-176fa3c9f000}" numberOfContinuousStates="1">
  <ModelVariables>
    <ScalarVariable name="TRoo" valueReference="0" causality="input"><Real/></ScalarVariable>
    <ScalarVariable name="TOut" valueReference="1" causality="input"><Real/></ScalarVariable>
    <ScalarVariable name="TSetHea" valueReference="2" causality="output"><Real/></ScalarVariable>
    <ScalarVariable name="x" valueReference="3"><Real start="1"/></ScalarVariable>
  </ModelVariables>
</fmiModelDescription>"#;

    #[test]
    fn parses_header_and_variables() {
        let md = ModelDescription::parse(XML).expect("valid description");
        assert_eq!(md.fmi_version, "1.0");
        assert_eq!(md.model_identifier, "Room");
        assert_eq!(md.variables.len(), 4);
        assert_eq!(md.count(Causality::Input), 2);
        assert_eq!(md.count(Causality::Output), 1);
        assert_eq!(md.count(Causality::Internal), 1);
    }

    #[test]
    fn value_reference_distinguishes_failures() {
        let md = ModelDescription::parse(XML).expect("valid description");
        assert_eq!(md.value_reference("TOut", Causality::Input).ok(), Some(1));
        assert!(matches!(
            md.value_reference("nope", Causality::Input),
            Err(SlaveError::UnknownVariable(_))
        ));
        assert!(matches!(
            md.value_reference("TSetHea", Causality::Input),
            Err(SlaveError::WrongCausality { .. })
        ));
    }

    #[test]
    fn rejects_foreign_root() {
        assert!(ModelDescription::parse("<fmiModelDescriptio/>").is_err());
        assert!(ModelDescription::parse("<fmiModelDescription fmiVersion=\"1.0\"/>").is_err());
    }

    #[test]
    fn reads_from_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(FILE_NAME), XML).expect("write");
        let md = ModelDescription::from_dir(dir.path()).expect("read");
        assert_eq!(md.guid, "{8c4e810f-3df3-4a00-8276-176fa3c9f000}");
        let missing = ModelDescription::from_dir(&dir.path().join("absent"));
        assert!(matches!(missing, Err(SlaveError::ModelDescription { .. })));
    }
}
