//! Copy input shapes.
//!
//! A copy names its source and destination in exactly one of five ways.
//! [`CopyArgs`] is the loose boundary form where every field is optional;
//! [`CopyArgs::into_input`] decides the single [`CopyInput`] shape before
//! any channel is touched.
//!
//! | shape              | mandatory                                  | optional    |
//! |--------------------|--------------------------------------------|-------------|
//! | `Names`            | src-container, src-blob, dest-container    | dest-blob   |
//! | `Uri`              | src-uri, dest-container, dest-blob         |             |
//! | `SourceBlob`       | src-ref, dest-container                    | dest-blob   |
//! | `SourceContainer`  | src-container-ref, src-blob, dest-container| dest-blob   |
//! | `BlobPair`         | src-ref, dest-ref                          |             |

use std::fmt;

use url::Url;

use crate::errors::CopyError;
use crate::model::{BlobReference, ContainerReference};

/// One way of naming a copy's source and destination.
#[derive(Debug, Clone, PartialEq)]
pub enum CopyInput {
    /// Source and destination named by container and blob names.
    Names {
        src_container: String,
        src_blob: String,
        dest_container: String,
        dest_blob: Option<String>,
    },
    /// Source given as a URL the service reads directly.
    Uri {
        src_uri: Url,
        dest_container: String,
        dest_blob: String,
    },
    /// Source given as an already resolved blob.
    SourceBlob {
        source: BlobReference,
        dest_container: String,
        dest_blob: Option<String>,
    },
    /// Source blob named inside an already resolved container.
    SourceContainer {
        container: ContainerReference,
        src_blob: String,
        dest_container: String,
        dest_blob: Option<String>,
    },
    /// Both ends already resolved.
    BlobPair {
        source: BlobReference,
        destination: BlobReference,
    },
}

impl CopyInput {
    pub fn shape(&self) -> CopyShape {
        match self {
            CopyInput::Names { .. } => CopyShape::Names,
            CopyInput::Uri { .. } => CopyShape::Uri,
            CopyInput::SourceBlob { .. } => CopyShape::SourceBlob,
            CopyInput::SourceContainer { .. } => CopyShape::SourceContainer,
            CopyInput::BlobPair { .. } => CopyShape::BlobPair,
        }
    }
}

/// Discriminant of [`CopyInput`], used for logging and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyShape {
    Names,
    Uri,
    SourceBlob,
    SourceContainer,
    BlobPair,
}

impl CopyShape {
    const ALL: [CopyShape; 5] = [
        CopyShape::Names,
        CopyShape::Uri,
        CopyShape::SourceBlob,
        CopyShape::SourceContainer,
        CopyShape::BlobPair,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CopyShape::Names => "names",
            CopyShape::Uri => "uri",
            CopyShape::SourceBlob => "source-blob",
            CopyShape::SourceContainer => "source-container",
            CopyShape::BlobPair => "blob-pair",
        }
    }

    fn mandatory(self) -> &'static [Field] {
        use Field::*;
        match self {
            CopyShape::Names => &[SrcContainer, SrcBlob, DestContainer],
            CopyShape::Uri => &[SrcUri, DestContainer, DestBlob],
            CopyShape::SourceBlob => &[SrcRef, DestContainer],
            CopyShape::SourceContainer => &[SrcContainerRef, SrcBlob, DestContainer],
            CopyShape::BlobPair => &[SrcRef, DestRef],
        }
    }

    fn optional(self) -> &'static [Field] {
        match self {
            CopyShape::Names | CopyShape::SourceBlob | CopyShape::SourceContainer => {
                &[Field::DestBlob]
            }
            CopyShape::Uri | CopyShape::BlobPair => &[],
        }
    }

    fn allows(self, field: Field) -> bool {
        self.mandatory().contains(&field) || self.optional().contains(&field)
    }

    /// Phrase used in error messages, e.g. "copying from src-uri".
    fn describe(self) -> &'static str {
        match self {
            CopyShape::Names => "copying from src-container",
            CopyShape::Uri => "copying from src-uri",
            CopyShape::SourceBlob => "copying from src-ref",
            CopyShape::SourceContainer => "copying from src-container-ref",
            CopyShape::BlobPair => "copying from src-ref to dest-ref",
        }
    }
}

impl fmt::Display for CopyShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    SrcContainer,
    SrcBlob,
    DestContainer,
    DestBlob,
    SrcUri,
    SrcRef,
    SrcContainerRef,
    DestRef,
}

impl Field {
    fn flag(self) -> &'static str {
        match self {
            Field::SrcContainer => "src-container",
            Field::SrcBlob => "src-blob",
            Field::DestContainer => "dest-container",
            Field::DestBlob => "dest-blob",
            Field::SrcUri => "src-uri",
            Field::SrcRef => "src-ref",
            Field::SrcContainerRef => "src-container-ref",
            Field::DestRef => "dest-ref",
        }
    }
}

/// Join flag names as "a", "a and b", "a, b and c".
fn join_flags(fields: &[Field]) -> String {
    let names: Vec<&str> = fields.iter().map(|f| f.flag()).collect();
    match names.split_last() {
        None => String::new(),
        Some((last, [])) => last.to_string(),
        Some((last, rest)) => format!("{} and {}", rest.join(", "), last),
    }
}

/// Copy arguments as received at the boundary.  Empty strings count as
/// omitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyArgs {
    pub src_container: Option<String>,
    pub src_blob: Option<String>,
    pub dest_container: Option<String>,
    pub dest_blob: Option<String>,
    pub src_uri: Option<Url>,
    /// URL of an existing source blob.
    pub src_ref: Option<Url>,
    /// URL of an existing source container.
    pub src_container_ref: Option<Url>,
    /// URL of the destination blob.
    pub dest_ref: Option<Url>,
}

impl CopyArgs {
    fn present(&self) -> Vec<Field> {
        let mut fields = Vec::new();
        let mut mark = |set: bool, field: Field| {
            if set {
                fields.push(field);
            }
        };
        mark(self.src_container.is_some(), Field::SrcContainer);
        mark(self.src_blob.is_some(), Field::SrcBlob);
        mark(self.dest_container.is_some(), Field::DestContainer);
        mark(self.dest_blob.is_some(), Field::DestBlob);
        mark(self.src_uri.is_some(), Field::SrcUri);
        mark(self.src_ref.is_some(), Field::SrcRef);
        mark(self.src_container_ref.is_some(), Field::SrcContainerRef);
        mark(self.dest_ref.is_some(), Field::DestRef);
        fields
    }

    fn normalized(mut self) -> Self {
        for field in [
            &mut self.src_container,
            &mut self.src_blob,
            &mut self.dest_container,
            &mut self.dest_blob,
        ] {
            if field.as_deref() == Some("") {
                *field = None;
            }
        }
        self
    }

    /// Select the single shape these arguments satisfy.
    ///
    /// Fails with [`CopyError::Configuration`] when no shape or several
    /// shapes are satisfied, or when a field foreign to the satisfied
    /// shape is present.  Never performs I/O.
    pub fn into_input(self) -> Result<CopyInput, CopyError> {
        let args = self.normalized();
        let present = args.present();

        if present.is_empty() {
            return Err(CopyError::configuration(
                "No copy source given: use src-container, src-uri, src-ref or src-container-ref",
            ));
        }

        let satisfied: Vec<CopyShape> = CopyShape::ALL
            .into_iter()
            .filter(|shape| shape.mandatory().iter().all(|f| present.contains(f)))
            .collect();

        match satisfied.as_slice() {
            [shape] => {
                let stray: Vec<Field> = present
                    .iter()
                    .copied()
                    .filter(|f| !shape.allows(*f))
                    .collect();
                if !stray.is_empty() {
                    return Err(CopyError::configuration(format!(
                        "{} can not be used when {}",
                        join_flags(&stray),
                        shape.describe()
                    )));
                }
                args.build(*shape)
            }
            [] => Err(missing_fields_error(&present)),
            many => {
                let phrases: Vec<&str> = many.iter().map(|s| s.describe()).collect();
                Err(CopyError::configuration(format!(
                    "Ambiguous copy arguments: they match {}",
                    phrases.join(" and ")
                )))
            }
        }
    }

    fn build(self, shape: CopyShape) -> Result<CopyInput, CopyError> {
        Ok(match shape {
            CopyShape::Names => CopyInput::Names {
                src_container: required(self.src_container, Field::SrcContainer)?,
                src_blob: required(self.src_blob, Field::SrcBlob)?,
                dest_container: required(self.dest_container, Field::DestContainer)?,
                dest_blob: self.dest_blob,
            },
            CopyShape::Uri => CopyInput::Uri {
                src_uri: required(self.src_uri, Field::SrcUri)?,
                dest_container: required(self.dest_container, Field::DestContainer)?,
                dest_blob: required(self.dest_blob, Field::DestBlob)?,
            },
            CopyShape::SourceBlob => CopyInput::SourceBlob {
                source: BlobReference::from_uri(&reference(self.src_ref, Field::SrcRef)?)?,
                dest_container: required(self.dest_container, Field::DestContainer)?,
                dest_blob: self.dest_blob,
            },
            CopyShape::SourceContainer => CopyInput::SourceContainer {
                container: ContainerReference::from_uri(&reference(
                    self.src_container_ref,
                    Field::SrcContainerRef,
                )?)?,
                src_blob: required(self.src_blob, Field::SrcBlob)?,
                dest_container: required(self.dest_container, Field::DestContainer)?,
                dest_blob: self.dest_blob,
            },
            CopyShape::BlobPair => CopyInput::BlobPair {
                source: BlobReference::from_uri(&reference(self.src_ref, Field::SrcRef)?)?,
                destination: BlobReference::from_uri(&reference(self.dest_ref, Field::DestRef)?)?,
            },
        })
    }
}

fn required<T>(value: Option<T>, field: Field) -> Result<T, CopyError> {
    value.ok_or_else(|| CopyError::configuration(format!("{} is mandatory", field.flag())))
}

/// A reference URL names a blob or container on a configured context and
/// is authorized through that context, so a query string (typically a SAS)
/// would be dropped.  SAS-authorized sources go through `src-uri`.
fn reference(value: Option<Url>, field: Field) -> Result<Url, CopyError> {
    let url = required(value, field)?;
    if url.query().is_some() {
        return Err(CopyError::configuration(format!(
            "{} '{}' carries a query string; pass SAS-authorized sources with src-uri",
            field.flag(),
            url
        )));
    }
    Ok(url)
}

/// Error for arguments that satisfy no shape, naming what the closest
/// shape still needs.  Closest means most mandatory fields present, then
/// fewest missing, then declaration order.
fn missing_fields_error(present: &[Field]) -> CopyError {
    let mut best: Option<(CopyShape, usize, Vec<Field>)> = None;
    for shape in CopyShape::ALL {
        let have = shape
            .mandatory()
            .iter()
            .filter(|f| present.contains(f))
            .count();
        let missing: Vec<Field> = shape
            .mandatory()
            .iter()
            .copied()
            .filter(|f| !present.contains(f))
            .collect();
        let better = match &best {
            None => true,
            Some((_, best_have, best_missing)) => {
                have > *best_have || (have == *best_have && missing.len() < best_missing.len())
            }
        };
        if better {
            best = Some((shape, have, missing));
        }
    }

    match best {
        Some((shape, _, missing)) => {
            let verb = if missing.len() == 1 { "is" } else { "are" };
            CopyError::configuration(format!(
                "{} {} mandatory when {}",
                join_flags(&missing),
                verb,
                shape.describe()
            ))
        }
        None => CopyError::configuration("No copy shape matches the given arguments"),
    }
}
