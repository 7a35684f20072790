use std::sync::Arc;

use crate::{CallbackError, Signature, SignatureError, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: String,
    pub signature: Signature,
}

/// Methods a host class exposes to native code.
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    name: String,
    static_methods: Vec<MethodDescriptor>,
    instance_methods: Vec<MethodDescriptor>,
}

impl ClassDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            static_methods: Vec::new(),
            instance_methods: Vec::new(),
        }
    }

    pub fn with_static_method(mut self, name: &str, descriptor: &str) -> Result<Self, SignatureError> {
        self.static_methods.push(MethodDescriptor {
            name: name.into(),
            signature: Signature::parse(descriptor)?,
        });
        Ok(self)
    }

    pub fn with_instance_method(
        mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<Self, SignatureError> {
        self.instance_methods.push(MethodDescriptor {
            name: name.into(),
            signature: Signature::parse(descriptor)?,
        });
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn static_methods(&self) -> &[MethodDescriptor] {
        &self.static_methods
    }

    pub fn instance_methods(&self) -> &[MethodDescriptor] {
        &self.instance_methods
    }

    pub fn static_method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.static_methods.iter().find(|m| m.name == name)
    }

    pub fn instance_method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.instance_methods.iter().find(|m| m.name == name)
    }
}

/// Where a host callback originates from. Passed to managed methods so that
/// they can attribute their output.
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    pub entry_point: &'a str,
    pub module: &'a str,
}

/// Host class whose static methods native code may call.
///
/// Arguments have already been checked against the method signature when
/// `invoke_static` is called; the return value is checked afterwards.
pub trait ManagedClass: Send + Sync {
    fn descriptor(&self) -> &ClassDescriptor;

    fn invoke_static(
        &self,
        site: &CallSite,
        method: &str,
        args: &[Value],
    ) -> Result<Value, CallbackError>;
}

/// Host object that can be passed to native code.
pub trait ManagedObject: Send + Sync {
    fn descriptor(&self) -> &ClassDescriptor;

    fn invoke(&self, site: &CallSite, method: &str, args: &[Value]) -> Result<Value, CallbackError>;
}

/// Shared reference to a [`ManagedObject`]. Equality is identity.
#[derive(Clone)]
pub struct ObjectRef(Arc<dyn ManagedObject>);

impl ObjectRef {
    pub fn new<T: ManagedObject + 'static>(object: Arc<T>) -> Self {
        Self(object)
    }

    pub fn class_name(&self) -> &str {
        self.0.descriptor().name()
    }

    pub fn object(&self) -> &Arc<dyn ManagedObject> {
        &self.0
    }
}

impl std::fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ObjectRef").field(&self.class_name()).finish()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{CallSite, ClassDescriptor, ManagedObject, ObjectRef};
    use crate::{CallbackError, Value, ValueType};

    struct Counter(ClassDescriptor);

    impl ManagedObject for Counter {
        fn descriptor(&self) -> &ClassDescriptor {
            &self.0
        }

        fn invoke(&self, _: &CallSite, _: &str, _: &[Value]) -> Result<Value, CallbackError> {
            Ok(Value::Void)
        }
    }

    fn counter() -> Arc<Counter> {
        Arc::new(Counter(
            ClassDescriptor::new("Counter")
                .with_instance_method("increment", "()V")
                .unwrap(),
        ))
    }

    #[test]
    fn test_descriptor_lookup() {
        let d = ClassDescriptor::new("V")
            .with_static_method("mixedArguments", "(ZI)I")
            .unwrap()
            .with_instance_method("setInt", "(I)V")
            .unwrap();
        assert_eq!(d.name(), "V");
        assert_eq!(
            d.static_method("mixedArguments").unwrap().signature.ret(),
            ValueType::I32
        );
        assert!(d.static_method("setInt").is_none());
        assert!(d.instance_method("setInt").is_some());
        assert!(ClassDescriptor::new("X").with_static_method("m", "(").is_err());
    }

    #[test]
    fn test_object_ref_identity() {
        let a = counter();
        let first = ObjectRef::new(a.clone());
        let second = ObjectRef::new(a);
        let other = ObjectRef::new(counter());
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(first.class_name(), "Counter");
    }
}
