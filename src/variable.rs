//! HIOA shared variables.
//!
//! A model exports a variable through an [`ExportedVar`] and other models
//! read it through [`ImportedVar`]s bound to it once, when the architecture
//! is built. There is no push notification: importers read the latest
//! written [`Value`] lazily, whenever their own transitions run.
//!
//! Exported variables are written only inside an internal transition:
//! [`ExportedVar::set`] requires the [`InternalTransition`] context, which
//! also stamps the value with the current state time. The one exception is
//! [`ExportedVar::initialise`], which requires the [`VariableInit`] context
//! of [`AtomicModel::initialise_variables`](crate::model::AtomicModel::initialise_variables).

use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::VariableError;
use crate::model::{InternalTransition, VariableInit};
use crate::time::Time;
use crate::types::{short_type_name, ModelUri};

/// Identity of the Rust type held by a variable.
#[derive(Clone, Copy)]
pub struct VariableType {
    id: TypeId,
    name: &'static str,
}

impl VariableType {
    /// The variable type of `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path segment of the type name.
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.name)
    }
}

impl PartialEq for VariableType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for VariableType {}

impl Hash for VariableType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VariableType({})", self.short_name())
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Declaration of an imported or exported variable.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VariableDecl {
    pub name: String,
    pub ty: VariableType,
}

impl VariableDecl {
    /// Declares a variable `name` holding values of type `T`.
    pub fn of<T: 'static>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: VariableType::of::<T>(),
        }
    }
}

/// A variable value stamped with the time it was written and its owner.
#[derive(Clone, Debug, PartialEq)]
pub struct Value<T> {
    pub v: T,
    pub time: Time,
    pub owner: ModelUri,
}

type Cell<T> = RwLock<Option<Value<T>>>;

/// Type-erased handle on an exported variable, used to bind importers.
#[derive(Clone)]
pub struct SharedVariable {
    owner: ModelUri,
    name: String,
    ty: VariableType,
    cell: Arc<dyn Any + Send + Sync>,
}

impl SharedVariable {
    /// URI of the exporting model.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Name under which the owner exports the variable.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type of the held values.
    pub fn ty(&self) -> VariableType {
        self.ty
    }
}

impl fmt::Debug for SharedVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedVariable")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("ty", &self.ty)
            .finish()
    }
}

/// A variable exported by its owning model.
pub struct ExportedVar<T> {
    owner: ModelUri,
    name: String,
    cell: Arc<Cell<T>>,
}

impl<T: Clone + Send + Sync + 'static> ExportedVar<T> {
    /// Creates an uninitialised exported variable.
    pub fn new(owner: impl Into<ModelUri>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            cell: Arc::new(RwLock::new(None)),
        }
    }

    /// Variable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declaration for the model interface.
    pub fn decl(&self) -> VariableDecl {
        VariableDecl::of::<T>(self.name.clone())
    }

    /// Writes the initial value, stamped with the start of the run.
    pub fn initialise(&self, ctx: &VariableInit<'_>, v: T) {
        self.write(v, ctx.start_time());
    }

    /// Writes a new value, stamped with the current state time.
    pub fn set(&self, ctx: &InternalTransition<'_>, v: T) {
        self.write(v, ctx.current_time());
    }

    fn write(&self, v: T, time: Time) {
        *self.cell.write() = Some(Value {
            v,
            time,
            owner: self.owner.clone(),
        });
    }

    /// Latest written value with its timestamp.
    pub fn read(&self) -> Result<Value<T>, VariableError> {
        self.cell
            .read()
            .clone()
            .ok_or_else(|| VariableError::Uninitialised {
                name: self.name.clone(),
            })
    }

    /// Latest written value.
    pub fn value(&self) -> Result<T, VariableError> {
        self.read().map(|value| value.v)
    }

    /// Type-erased handle used to bind importers.
    pub fn shared(&self) -> SharedVariable {
        SharedVariable {
            owner: self.owner.clone(),
            name: self.name.clone(),
            ty: VariableType::of::<T>(),
            cell: self.cell.clone(),
        }
    }
}

impl<T> fmt::Debug for ExportedVar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportedVar")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .finish()
    }
}

/// A read-only view on a variable exported by another model.
pub struct ImportedVar<T> {
    name: String,
    cell: Option<Arc<Cell<T>>>,
}

impl<T: Clone + Send + Sync + 'static> ImportedVar<T> {
    /// Creates an unbound imported variable.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cell: None,
        }
    }

    /// Variable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declaration for the model interface.
    pub fn decl(&self) -> VariableDecl {
        VariableDecl::of::<T>(self.name.clone())
    }

    /// Returns true once bound to an exported variable.
    pub fn is_bound(&self) -> bool {
        self.cell.is_some()
    }

    /// Binds this view to an exported variable of the same type.
    pub fn bind(&mut self, shared: &SharedVariable) -> Result<(), VariableError> {
        if self.cell.is_some() {
            return Err(VariableError::AlreadyBound {
                name: self.name.clone(),
            });
        }
        let mismatch = || VariableError::TypeMismatch {
            name: self.name.clone(),
            expected: std::any::type_name::<T>(),
            found: shared.ty.name(),
        };
        if shared.ty != VariableType::of::<T>() {
            return Err(mismatch());
        }
        let cell = shared
            .cell
            .clone()
            .downcast::<Cell<T>>()
            .map_err(|_| mismatch())?;
        self.cell = Some(cell);
        Ok(())
    }

    /// Latest value written by the exporter.
    pub fn read(&self) -> Result<Value<T>, VariableError> {
        let cell = self.cell.as_ref().ok_or_else(|| VariableError::Unbound {
            name: self.name.clone(),
        })?;
        let value = cell.read().clone();
        value.ok_or_else(|| VariableError::Uninitialised {
            name: self.name.clone(),
        })
    }

    /// Latest value written by the exporter, without its timestamp.
    pub fn value(&self) -> Result<T, VariableError> {
        self.read().map(|value| value.v)
    }
}

impl<T> fmt::Debug for ImportedVar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportedVar")
            .field("name", &self.name)
            .field("bound", &self.cell.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{Duration, TimeUnit};

    fn at(t: f64) -> Time {
        Time::new(t, TimeUnit::Seconds)
    }

    #[test]
    fn test_variable_type_identity() {
        assert_eq!(VariableType::of::<f64>(), VariableType::of::<f64>());
        assert_ne!(VariableType::of::<f64>(), VariableType::of::<f32>());
        assert_eq!(VariableType::of::<f64>().short_name(), "f64");
        assert_eq!(VariableDecl::of::<bool>("on").ty, VariableType::of::<bool>());
    }

    #[test]
    fn test_bind_and_read_latest_value() {
        let exported = ExportedVar::<f64>::new("battery", "charge");
        let mut imported = ImportedVar::<f64>::new("charge");
        assert!(!imported.is_bound());

        imported.bind(&exported.shared()).unwrap();
        assert!(imported.is_bound());
        assert!(matches!(
            imported.read(),
            Err(VariableError::Uninitialised { .. })
        ));

        exported.initialise(&VariableInit::new("battery", at(0.0)), 10.0);
        let ctx = InternalTransition::new("battery", at(3.0), Duration::new(3.0, TimeUnit::Seconds), None);
        exported.set(&ctx, 7.5);

        let value = imported.read().unwrap();
        assert_eq!(value.v, 7.5);
        assert_eq!(value.time, at(3.0));
        assert_eq!(value.owner, "battery");
        assert_eq!(exported.value().unwrap(), 7.5);
    }

    #[test]
    fn test_unbound_read_fails() {
        let imported = ImportedVar::<f64>::new("level");
        assert_eq!(
            imported.value(),
            Err(VariableError::Unbound {
                name: "level".to_string()
            })
        );
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let exported = ExportedVar::<bool>::new("fan", "on");
        let mut imported = ImportedVar::<f64>::new("on");
        let err = imported.bind(&exported.shared()).unwrap_err();
        assert!(matches!(err, VariableError::TypeMismatch { .. }));
        assert!(!imported.is_bound());
    }

    #[test]
    fn test_double_bind_rejected() {
        let exported = ExportedVar::<f64>::new("solar", "production");
        let mut imported = ImportedVar::<f64>::new("production");
        imported.bind(&exported.shared()).unwrap();
        assert!(matches!(
            imported.bind(&exported.shared()),
            Err(VariableError::AlreadyBound { .. })
        ));
    }

    #[test]
    fn test_many_importers_share_one_exporter() {
        let exported = ExportedVar::<i64>::new("counter", "count");
        let mut a = ImportedVar::<i64>::new("count");
        let mut b = ImportedVar::<i64>::new("count");
        a.bind(&exported.shared()).unwrap();
        b.bind(&exported.shared()).unwrap();

        exported.initialise(&VariableInit::new("counter", at(1.0)), 4);
        assert_eq!(a.value().unwrap(), 4);
        assert_eq!(b.value().unwrap(), 4);
    }

    #[test]
    fn test_shared_metadata() {
        let exported = ExportedVar::<f64>::new("fan", "intensity");
        let shared = exported.shared();
        assert_eq!(shared.owner(), "fan");
        assert_eq!(shared.name(), "intensity");
        assert_eq!(shared.ty(), VariableType::of::<f64>());
        assert_eq!(exported.decl(), VariableDecl::of::<f64>("intensity"));
    }
}
