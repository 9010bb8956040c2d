//! Connection and variable-mapping descriptors of the socket protocol.
//!
//! Both files are small XML documents written by the external orchestrator:
//!
//! ```xml
//! <BCVTB-client>
//!   <ipc><socket port="53219" hostname="localhost"/></ipc>
//! </BCVTB-client>
//! ```
//!
//! ```xml
//! <BCVTB-variables>
//!   <variable source="Ptolemy"><EnergyPlus schedule="TSetHea"/></variable>
//!   <variable source="EnergyPlus"><EnergyPlus name="ZONE 1" type="Zone Mean Air Temperature"/></variable>
//! </BCVTB-variables>
//! ```

use std::fs;
use std::path::Path;

use roxmltree::{Document, Node};

use crate::error::{CosimError, CosimResult, SocketError};
use crate::marshal::{check_capacity, join_delimited, split_delimited};
use crate::resolver::BindingKind;

/// Bytes reserved per exchanged name in the delimited descriptor strings.
pub const MAX_NAME_LENGTH: usize = 100;

const CLIENT_ROOT: &str = "BCVTB-client";
const VARIABLES_ROOT: &str = "BCVTB-variables";
const SOURCE_HOST: &str = "EnergyPlus";
const SOURCE_PEER: &str = "Ptolemy";

fn read_descriptor(path: &Path) -> Result<String, SocketError> {
    if !path.exists() {
        return Err(SocketError::DescriptorNotFound(path.to_path_buf()));
    }
    fs::read_to_string(path).map_err(|e| invalid(path, e.to_string()))
}

fn invalid(path: &Path, reason: impl Into<String>) -> SocketError {
    SocketError::Descriptor {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn parse_document<'a>(path: &Path, text: &'a str, root: &str) -> Result<Document<'a>, SocketError> {
    let doc = Document::parse(text).map_err(|e| invalid(path, e.to_string()))?;
    let found = doc.root_element().tag_name().name();
    if found != root {
        return Err(invalid(path, format!("root element is <{found}>, expected <{root}>")));
    }
    Ok(doc)
}

/// Address of the external orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketDescriptor {
    pub hostname: String,
    pub port: u16,
}

impl SocketDescriptor {
    /// Reads the connection descriptor at `path`.
    ///
    /// # Errors
    ///
    /// [`SocketError::DescriptorNotFound`] if the file is absent, otherwise
    /// [`SocketError::Descriptor`] for unreadable or malformed content.
    pub fn from_file(path: &Path) -> Result<Self, SocketError> {
        let text = read_descriptor(path)?;
        Self::parse(path, &text)
    }

    /// Parses descriptor `text`; `path` only labels errors.
    pub fn parse(path: &Path, text: &str) -> Result<Self, SocketError> {
        let doc = parse_document(path, text, CLIENT_ROOT)?;
        let socket = doc
            .descendants()
            .find(|n| n.has_tag_name("ipc"))
            .and_then(|ipc| ipc.children().find(|n| n.has_tag_name("socket")))
            .ok_or_else(|| invalid(path, "missing <ipc><socket/></ipc>"))?;
        let port = socket
            .attribute("port")
            .ok_or_else(|| invalid(path, "socket has no port attribute"))?
            .trim()
            .parse::<u16>()
            .map_err(|e| invalid(path, format!("bad port: {e}")))?;
        let hostname = socket.attribute("hostname").unwrap_or("localhost").trim();
        Ok(Self {
            hostname: hostname.to_string(),
            port,
        })
    }

    /// `host:port` form accepted by the standard resolver.
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

/// A host report variable sent to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentVariable {
    pub key: String,
    pub name: String,
}

/// A host entity written with a value received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedVariable {
    pub kind: BindingKind,
    pub name: String,
}

/// Ordered lists of exchanged variables; position is the wire contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableMap {
    pub sent: Vec<SentVariable>,
    pub received: Vec<ReceivedVariable>,
}

/// The three `;`-delimited strings a variable map is carried in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelimitedVariables {
    /// Keys of the sent variables.
    pub keys: String,
    /// Names of the sent variables.
    pub names: String,
    /// Names of the received variables.
    pub inputs: String,
    pub input_kinds: Vec<BindingKind>,
}

impl VariableMap {
    /// Reads the mapping at `path` and checks it against `capacity`.
    ///
    /// The mapping travels through the delimited-string form, so names are
    /// upper-cased and each string must fit `capacity * MAX_NAME_LENGTH`
    /// bytes.
    ///
    /// # Errors
    ///
    /// Descriptor errors, [`CosimError::Marshal`] for an oversized string and
    /// [`CosimError::TooManyVariables`] if more than `capacity` variables
    /// are exchanged in total.
    pub fn load(path: &Path, capacity: usize) -> CosimResult<Self> {
        let text = read_descriptor(path)?;
        let parsed = Self::parse(path, &text)?;
        let delimited = parsed.to_delimited();

        let buffer = capacity.saturating_mul(MAX_NAME_LENGTH);
        check_capacity("output keys", &delimited.keys, buffer)?;
        check_capacity("output names", &delimited.names, buffer)?;
        check_capacity("input names", &delimited.inputs, buffer)?;

        let (outputs, inputs) = (parsed.sent.len(), parsed.received.len());
        if outputs + inputs > capacity {
            return Err(CosimError::TooManyVariables {
                outputs,
                inputs,
                capacity,
            });
        }
        Ok(Self::from_delimited(&delimited, outputs))
    }

    /// Parses mapping `text`; `path` only labels errors.
    pub fn parse(path: &Path, text: &str) -> Result<Self, SocketError> {
        let doc = parse_document(path, text, VARIABLES_ROOT)?;
        let mut map = Self::default();
        for var in doc.root_element().children().filter(|n| n.has_tag_name("variable")) {
            let Some(entry) = var.children().find(Node::is_element) else {
                return Err(invalid(path, "<variable> without an entry element"));
            };
            match var.attribute("source") {
                Some(SOURCE_HOST) => {
                    let (Some(key), Some(name)) = (entry.attribute("name"), entry.attribute("type"))
                    else {
                        return Err(invalid(path, "sent variable needs name and type attributes"));
                    };
                    map.sent.push(SentVariable {
                        key: key.to_string(),
                        name: name.to_string(),
                    });
                }
                Some(SOURCE_PEER) => {
                    let received = BindingKind::ALL
                        .into_iter()
                        .find_map(|kind| entry.attribute(kind.tag()).map(|n| (kind, n)));
                    let Some((kind, name)) = received else {
                        return Err(invalid(
                            path,
                            "received variable needs a schedule, variable or actuator attribute",
                        ));
                    };
                    map.received.push(ReceivedVariable {
                        kind,
                        name: name.to_string(),
                    });
                }
                other => {
                    return Err(invalid(
                        path,
                        format!("unknown variable source {:?}", other.unwrap_or_default()),
                    ));
                }
            }
        }
        Ok(map)
    }

    /// Delimited-string form of the mapping.
    pub fn to_delimited(&self) -> DelimitedVariables {
        DelimitedVariables {
            keys: join_delimited(self.sent.iter().map(|v| v.key.as_str())),
            names: join_delimited(self.sent.iter().map(|v| v.name.as_str())),
            inputs: join_delimited(self.received.iter().map(|v| v.name.as_str())),
            input_kinds: self.received.iter().map(|v| v.kind).collect(),
        }
    }

    /// Rebuilds a mapping of `outputs` sent variables from its delimited form.
    pub fn from_delimited(d: &DelimitedVariables, outputs: usize) -> Self {
        let keys = split_delimited(&d.keys, outputs);
        let names = split_delimited(&d.names, outputs);
        let inputs = split_delimited(&d.inputs, d.input_kinds.len());
        Self {
            sent: keys
                .into_iter()
                .zip(names)
                .map(|(key, name)| SentVariable { key, name })
                .collect(),
            received: d
                .input_kinds
                .iter()
                .zip(inputs)
                .map(|(&kind, name)| ReceivedVariable { kind, name })
                .collect(),
        }
    }
}
