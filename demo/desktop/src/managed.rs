use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use crosscall_boundary::{
    CallSite, CallbackError, ClassDescriptor, Dispatcher, ManagedClass, ManagedObject, ObjectRef,
    Registry, SignatureError, Value,
};
use log::info;

fn descriptor() -> Result<ClassDescriptor, SignatureError> {
    ClassDescriptor::new("V")
        .with_static_method("vprintln", "(T)V")?
        .with_static_method("javaFloatFunc", "(TI)F")?
        .with_static_method("javaVoidFunc", "(TI)V")?
        .with_static_method("mixedArguments", "(ZI)I")?
        .with_static_method("getInt", "()I")?
        .with_static_method("getBool", "()Z")?
        .with_static_method("getFloat", "()F")?
        .with_static_method("getString", "()T")?
        .with_static_method("getStringFromJava", "()T")?
        .with_instance_method("setInt", "(I)V")
}

pub fn mixed_arguments(add_i: bool, i: i32) -> i32 {
    let mut out = 40;
    if add_i {
        out += i;
    }
    out
}

/// Host class whose static methods native code calls back into.
pub struct V {
    descriptor: ClassDescriptor,
}

impl V {
    pub fn new() -> Result<Self, SignatureError> {
        Ok(Self {
            descriptor: descriptor()?,
        })
    }
}

impl ManagedClass for V {
    fn descriptor(&self) -> &ClassDescriptor {
        &self.descriptor
    }

    fn invoke_static(
        &self,
        site: &CallSite,
        method: &str,
        args: &[Value],
    ) -> Result<Value, CallbackError> {
        let caller = site.entry_point;
        match (method, args) {
            ("vprintln", [Value::String(s)]) => {
                info!("V.vprintln(\"{s}\") called by {caller}");
                Ok(Value::Void)
            }
            ("javaFloatFunc", [Value::String(s), Value::I32(i)]) => {
                info!("V.javaFloatFunc(\"{s}\", {i}) called by {caller}");
                Ok(Value::F32(0.5))
            }
            ("javaVoidFunc", [Value::String(s), Value::I32(i)]) => {
                info!("V.javaVoidFunc(\"{s}\", {i}) called by {caller}");
                Ok(Value::Void)
            }
            ("mixedArguments", [Value::Bool(add_i), Value::I32(i)]) => {
                info!("V.mixedArguments({add_i}, {i}) called by {caller}");
                Ok(Value::I32(mixed_arguments(*add_i, *i)))
            }
            ("getInt", []) => Ok(Value::I32(42)),
            ("getBool", []) => Ok(Value::Bool(false)),
            ("getFloat", []) => Ok(Value::F32(42.5)),
            ("getString", []) => Ok("Test string".into()),
            ("getStringFromJava", []) => Ok("Hello from Java!".into()),
            _ => Err(CallbackError::NoSuchMethod {
                class: "V".into(),
                method: method.into(),
            }),
        }
    }
}

/// Instance of `V` passed to native code.
pub struct VObject {
    descriptor: ClassDescriptor,
    int_test: AtomicI32,
}

impl VObject {
    pub fn new() -> Result<Arc<Self>, SignatureError> {
        Ok(Arc::new(Self {
            descriptor: descriptor()?,
            int_test: AtomicI32::new(0),
        }))
    }

    pub fn int_test(&self) -> i32 {
        self.int_test.load(Ordering::SeqCst)
    }

    pub fn to_ref(self: &Arc<Self>) -> ObjectRef {
        ObjectRef::new(self.clone())
    }
}

impl ManagedObject for VObject {
    fn descriptor(&self) -> &ClassDescriptor {
        &self.descriptor
    }

    fn invoke(&self, site: &CallSite, method: &str, args: &[Value]) -> Result<Value, CallbackError> {
        match (method, args) {
            ("setInt", [Value::I32(value)]) => {
                self.int_test.store(*value, Ordering::SeqCst);
                info!("V.setInt() called by {} value: {value}", site.entry_point);
                Ok(Value::Void)
            }
            _ => Err(CallbackError::NoSuchMethod {
                class: "V".into(),
                method: method.into(),
            }),
        }
    }
}

/// Dispatcher with class `V` registered.
pub fn dispatcher(registry: Arc<Registry>) -> Result<Dispatcher, SignatureError> {
    let mut dispatcher = Dispatcher::new(registry);
    dispatcher.register_class(Arc::new(V::new()?));
    Ok(dispatcher)
}
