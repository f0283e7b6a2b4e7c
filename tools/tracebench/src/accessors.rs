//! Accessor installation, chosen once per session from what the host offers.

use crate::heap::{AccessorBinding, Heap, Property};
use crate::types::AccessorSupport;
use crate::value::{ObjectId, StubId};

pub const GETTERS_UNAVAILABLE: &str =
    "this replay requires getters, and the host engine cannot define them";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessorSpec {
    pub getter: StubId,
    pub setter: Option<StubId>,
    pub claim_on_write: bool,
}

pub trait PropertyAccessorInstaller: Send + Sync {
    fn support(&self) -> AccessorSupport;

    /// Installs `spec` as `object[prop]`, replacing any previous property.
    fn install(
        &self,
        heap: &mut Heap,
        object: ObjectId,
        prop: &str,
        spec: AccessorSpec,
    ) -> Result<(), String>;
}

/// `Object.defineProperty` with an enumerable accessor.
pub struct DefinePropertyInstaller;

impl PropertyAccessorInstaller for DefinePropertyInstaller {
    fn support(&self) -> AccessorSupport {
        AccessorSupport::DefineProperty
    }

    fn install(
        &self,
        heap: &mut Heap,
        object: ObjectId,
        prop: &str,
        spec: AccessorSpec,
    ) -> Result<(), String> {
        heap.define(
            object,
            prop,
            Property::Accessor(AccessorBinding {
                getter: spec.getter,
                setter: spec.setter,
                claim_on_write: spec.claim_on_write,
                enumerable: true,
            }),
        );
        Ok(())
    }
}

/// `__defineGetter__` / `__defineSetter__`: the accessor replaces whatever
/// was there.
pub struct LegacyAccessorInstaller;

impl PropertyAccessorInstaller for LegacyAccessorInstaller {
    fn support(&self) -> AccessorSupport {
        AccessorSupport::Legacy
    }

    fn install(
        &self,
        heap: &mut Heap,
        object: ObjectId,
        prop: &str,
        spec: AccessorSpec,
    ) -> Result<(), String> {
        heap.remove(object, prop);
        heap.define(
            object,
            prop,
            Property::Accessor(AccessorBinding {
                getter: spec.getter,
                setter: spec.setter,
                claim_on_write: spec.claim_on_write,
                enumerable: true,
            }),
        );
        Ok(())
    }
}

pub struct UnavailableInstaller;

impl PropertyAccessorInstaller for UnavailableInstaller {
    fn support(&self) -> AccessorSupport {
        AccessorSupport::Unavailable
    }

    fn install(
        &self,
        _heap: &mut Heap,
        _object: ObjectId,
        _prop: &str,
        _spec: AccessorSpec,
    ) -> Result<(), String> {
        Err(GETTERS_UNAVAILABLE.to_string())
    }
}

pub fn select_installer(support: AccessorSupport) -> Box<dyn PropertyAccessorInstaller> {
    match support {
        AccessorSupport::DefineProperty => Box::new(DefinePropertyInstaller),
        AccessorSupport::Legacy => Box::new(LegacyAccessorInstaller),
        AccessorSupport::Unavailable => Box::new(UnavailableInstaller),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn spec() -> AccessorSpec {
        AccessorSpec {
            getter: StubId(0),
            setter: None,
            claim_on_write: true,
        }
    }

    #[test]
    fn each_support_level_selects_its_installer() {
        for support in [
            AccessorSupport::DefineProperty,
            AccessorSupport::Legacy,
            AccessorSupport::Unavailable,
        ] {
            assert_eq!(select_installer(support).support(), support);
        }
    }

    #[test]
    fn installers_replace_data_properties() {
        let mut heap = Heap::new();
        let obj = heap.alloc();
        for installer in [
            select_installer(AccessorSupport::DefineProperty),
            select_installer(AccessorSupport::Legacy),
        ] {
            heap.set_data(obj, "body", Value::Null);
            installer
                .install(&mut heap, obj, "body", spec())
                .expect("install");
            assert!(matches!(
                heap.property(obj, "body"),
                Some(Property::Accessor(binding)) if binding.claim_on_write && binding.enumerable
            ));
        }
    }

    #[test]
    fn accessors_can_be_redefined() {
        let mut heap = Heap::new();
        let obj = heap.alloc();
        let installer = select_installer(AccessorSupport::DefineProperty);
        installer
            .install(&mut heap, obj, "cookie", spec())
            .expect("first");
        let second = AccessorSpec {
            getter: StubId(1),
            setter: Some(StubId(2)),
            claim_on_write: false,
        };
        installer
            .install(&mut heap, obj, "cookie", second)
            .expect("redefine");
        assert!(matches!(
            heap.property(obj, "cookie"),
            Some(Property::Accessor(binding))
                if binding.getter == StubId(1) && binding.setter == Some(StubId(2))
        ));
    }

    #[test]
    fn unavailable_installer_refuses() {
        let mut heap = Heap::new();
        let obj = heap.alloc();
        let err = UnavailableInstaller
            .install(&mut heap, obj, "cookie", spec())
            .expect_err("refused");
        assert!(err.contains("getters"));
        assert!(!heap.has_property(obj, "cookie"));
    }
}
