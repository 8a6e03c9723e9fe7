//! Parameter schemas.
//!
//! A [`Schema`] is the compiled descriptor table of a parameter struct: one
//! entry per field, each pairing a [`FieldSpec`] with a typed accessor, plus
//! one entry per embedded sub-struct. Types describe themselves through
//! [`Params::describe`], usually generated by `#[derive(Params)]`.
//!
//! Schemas are compiled once per type and memoized; compile errors are
//! memoized too, so a bad declaration fails the same way every time.
//!
//! # Example
//!
//! ```
//! use keystone_bind::{FieldAnnotation, Params, Schema, SchemaBuilder};
//!
//! #[derive(Debug, Default)]
//! struct Lookup {
//!     id: String,
//!     verbose: bool,
//! }
//!
//! fn id(p: &mut Lookup) -> &mut String { &mut p.id }
//! fn verbose(p: &mut Lookup) -> &mut bool { &mut p.verbose }
//!
//! impl Params for Lookup {
//!     fn describe(schema: &mut SchemaBuilder<Self>) {
//!         schema
//!             .field(FieldAnnotation::new("url", "id").rules("required,uuid"), id)
//!             .field(FieldAnnotation::new("query", "verbose"), verbose);
//!     }
//! }
//!
//! let schema = Schema::<Lookup>::of().unwrap();
//! assert_eq!(schema.fields().len(), 2);
//! ```

use crate::bucket::Buckets;
use crate::error::SchemaError;
use crate::file::{FileSource, UploadedFile};
use crate::spec::{FieldAnnotation, FieldSpec};
use crate::value::{assign_list, assign_optional, assign_scalar, ParamValue};
use keystone_core::{AppError, AppResult};
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Cross-field validation run after a struct's own fields are bound.
///
/// Errors are reported exactly like field errors.
pub trait SelfValidate {
    /// Checks invariants spanning several fields.
    fn validate(&self) -> AppResult<()>;
}

/// A bindable parameter struct.
pub trait Params: Default + Send + Sync + 'static {
    /// Registers the fields of `Self` in declaration order.
    fn describe(schema: &mut SchemaBuilder<Self>);

    /// Returns `Some` if the type implements [`SelfValidate`].
    fn as_self_validate(&self) -> Option<&dyn SelfValidate> {
        None
    }
}

/// Typed access to one field of `T`.
pub type Accessor<T, F> = for<'a> fn(&'a mut T) -> &'a mut F;

/// The validated input handed to a field writer.
#[derive(Debug)]
pub(crate) enum Input {
    Scalar { value: String, present: bool },
    List(Vec<String>),
    File(Option<UploadedFile>),
}

/// How a field reads its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shape {
    Scalar,
    List,
    File,
}

type Writer<T> = Box<dyn Fn(&mut T, &FieldSpec, Input) -> AppResult<()> + Send + Sync>;
type EmbedBinder<T> =
    Box<dyn Fn(&mut T, &Buckets, Option<&dyn FileSource>) -> AppResult<()> + Send + Sync>;

pub(crate) struct FieldEntry<T> {
    pub(crate) spec: FieldSpec,
    pub(crate) shape: Shape,
    pub(crate) write: Writer<T>,
}

pub(crate) struct EmbedEntry<T> {
    pub(crate) type_name: &'static str,
    pub(crate) fields: Vec<FieldSpec>,
    pub(crate) bind: EmbedBinder<T>,
}

pub(crate) enum Entry<T> {
    Field(FieldEntry<T>),
    Embed(EmbedEntry<T>),
}

/// Collects the entries of a schema.
pub struct SchemaBuilder<T> {
    entries: Vec<Entry<T>>,
    error: Option<SchemaError>,
}

impl<T: Params> SchemaBuilder<T> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            error: None,
        }
    }

    fn parse(&mut self, annotation: &FieldAnnotation<'_>) -> Option<FieldSpec> {
        match FieldSpec::parse(annotation) {
            Ok(spec) => Some(spec),
            Err(err) => {
                self.error.get_or_insert(err);
                None
            }
        }
    }

    fn push(&mut self, annotation: &FieldAnnotation<'_>, shape: Shape, write: Writer<T>) {
        if let Some(spec) = self.parse(annotation) {
            self.entries.push(Entry::Field(FieldEntry { spec, shape, write }));
        }
    }

    /// Registers a plain scalar field.
    pub fn field<F: ParamValue>(
        &mut self,
        annotation: FieldAnnotation<'_>,
        access: Accessor<T, F>,
    ) -> &mut Self {
        self.push(
            &annotation,
            Shape::Scalar,
            Box::new(move |target: &mut T, spec: &FieldSpec, input: Input| match input {
                Input::Scalar { value, present } => {
                    assign_scalar(access(target), &spec.name, &value, present)
                }
                other => Err(shape_mismatch(spec, &other)),
            }),
        );
        self
    }

    /// Registers an `Option<F>` field, left `None` when never supplied.
    pub fn optional<F: ParamValue>(
        &mut self,
        annotation: FieldAnnotation<'_>,
        access: Accessor<T, Option<F>>,
    ) -> &mut Self {
        self.push(
            &annotation,
            Shape::Scalar,
            Box::new(move |target: &mut T, spec: &FieldSpec, input: Input| match input {
                Input::Scalar { value, present } => {
                    assign_optional(access(target), &spec.name, &value, present)
                }
                other => Err(shape_mismatch(spec, &other)),
            }),
        );
        self
    }

    /// Registers a `Vec<F>` field bound from every value of its key.
    pub fn list<F: ParamValue>(
        &mut self,
        annotation: FieldAnnotation<'_>,
        access: Accessor<T, Vec<F>>,
    ) -> &mut Self {
        self.push(
            &annotation,
            Shape::List,
            Box::new(move |target: &mut T, spec: &FieldSpec, input: Input| match input {
                Input::List(values) => assign_list(access(target), &spec.name, &values),
                other => Err(shape_mismatch(spec, &other)),
            }),
        );
        self
    }

    /// Registers an uploaded file field.
    pub fn file(
        &mut self,
        annotation: FieldAnnotation<'_>,
        access: Accessor<T, Option<UploadedFile>>,
    ) -> &mut Self {
        self.push(
            &annotation,
            Shape::File,
            Box::new(move |target: &mut T, spec: &FieldSpec, input: Input| match input {
                Input::File(file) => {
                    if file.is_some() {
                        *access(target) = file;
                    }
                    Ok(())
                }
                other => Err(shape_mismatch(spec, &other)),
            }),
        );
        self
    }

    /// Registers a field that is never bound.
    pub fn skip(&mut self) -> &mut Self {
        self.entries.push(Entry::Field(FieldEntry {
            spec: FieldSpec::ignored(),
            shape: Shape::Scalar,
            write: Box::new(|_, _, _| Ok(())),
        }));
        self
    }

    /// Embeds the fields of `S` as if they were declared here.
    pub fn embed<S: Params>(&mut self, access: Accessor<T, S>) -> &mut Self {
        let type_name = std::any::type_name::<S>();
        match Schema::<S>::of() {
            Ok(sub) => {
                let fields = sub.fields().into_iter().cloned().collect();
                self.entries.push(Entry::Embed(EmbedEntry {
                    type_name,
                    fields,
                    bind: Box::new(move |target: &mut T, buckets: &Buckets, files: Option<&dyn FileSource>| {
                        crate::binder::bind_into(access(target), buckets, files)
                    }),
                }));
            }
            Err(err) => {
                self.error.get_or_insert(SchemaError::Embedded {
                    embedded: type_name,
                    source: Box::new(err),
                });
            }
        }
        self
    }

    fn build(self) -> Result<Schema<T>, SchemaError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(Schema {
                entries: self.entries,
            }),
        }
    }
}

fn shape_mismatch(spec: &FieldSpec, input: &Input) -> AppError {
    AppError::internal(format!(
        "field `{}` received mismatched input {input:?}",
        spec.name
    ))
}

/// Compiled descriptor table of a parameter struct.
pub struct Schema<T> {
    pub(crate) entries: Vec<Entry<T>>,
}

type Cached<T> = Result<Arc<Schema<T>>, SchemaError>;
type Registry = Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

impl<T: Params> Schema<T> {
    /// Returns the memoized schema of `T`, compiling it on first use.
    pub fn of() -> Result<Arc<Self>, SchemaError> {
        let key = TypeId::of::<T>();
        let hit = registry().lock().get(&key).cloned();
        if let Some(hit) = hit {
            return Self::unpack(&hit);
        }

        // Compiled outside the lock: embedded schemas are looked up
        // recursively and the mutex is not reentrant.
        let compiled: Cached<T> = Self::compile().map(Arc::new);
        if let Err(err) = &compiled {
            tracing::error!(
                params = std::any::type_name::<T>(),
                error = %err,
                "invalid parameter schema"
            );
        }

        let entry = Arc::clone(
            registry()
                .lock()
                .entry(key)
                .or_insert_with(|| Arc::new(compiled) as Arc<dyn Any + Send + Sync>),
        );
        Self::unpack(&entry)
    }

    /// Compiles the schema of `T` without consulting the cache.
    pub fn compile() -> Result<Self, SchemaError> {
        let mut builder = SchemaBuilder::new();
        T::describe(&mut builder);
        builder.build()
    }

    fn unpack(entry: &Arc<dyn Any + Send + Sync>) -> Cached<T> {
        match entry.downcast_ref::<Cached<T>>() {
            Some(cached) => cached.clone(),
            None => Self::compile().map(Arc::new),
        }
    }

    /// Returns every bindable field, embedded ones flattened in place.
    #[must_use]
    pub fn fields(&self) -> Vec<&FieldSpec> {
        let mut out = Vec::new();
        for entry in &self.entries {
            match entry {
                Entry::Field(field) if !field.spec.ignore => out.push(&field.spec),
                Entry::Field(_) => {}
                Entry::Embed(embed) => out.extend(embed.fields.iter()),
            }
        }
        out
    }

    /// Looks up a field by its bucket key.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields().into_iter().find(|spec| spec.name == name)
    }

    /// Names of embedded types, in declaration order.
    #[must_use]
    pub fn embedded(&self) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Embed(embed) => Some(embed.type_name),
                Entry::Field(_) => None,
            })
            .collect()
    }
}

impl<T> std::fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("type", &std::any::type_name::<T>())
            .field("entries", &self.entries.len())
            .finish()
    }
}
