use crosscall_boundary::{Declaration, Dispatcher, InvocationError, SignatureError};
use log::{info, warn};

use crate::{managed::VObject, Result};

/// Native entry points called by the grab-bag.
pub struct Natives {
    pub get_string: Declaration,
    pub get_int: Declaration,
    pub add_int: Declaration,
    pub call_static_methods: Declaration,
    pub mixed_arguments: Declaration,
    pub call_object_methods: Declaration,
    /// Declared here but not exported by the native module.
    pub unimplemented: Declaration,
}

impl Natives {
    pub fn new() -> std::result::Result<Self, SignatureError> {
        Ok(Self {
            get_string: Declaration::parse("v_get_string", "()T")?,
            get_int: Declaration::parse("v_get_int", "()I")?,
            add_int: Declaration::parse("v_add_int", "(II)I")?,
            call_static_methods: Declaration::parse("v_call_static_methods", "()V")?,
            mixed_arguments: Declaration::parse("v_mixed_arguments", "(ZI)I")?,
            call_object_methods: Declaration::parse("v_call_object_methods", "(O)V")?,
            unimplemented: Declaration::parse("unimplemented_in_v", "()T")?,
        })
    }
}

pub fn run(dispatcher: &Dispatcher) -> Result<()> {
    let natives = Natives::new()?;

    let text: String = dispatcher.invoke(&natives.get_string, &[])?.try_into()?;
    info!("String from native: \"{text}\"");

    let int: i32 = dispatcher.invoke(&natives.get_int, &[])?.try_into()?;
    info!("Int from native: {int}");

    let sum: i32 = dispatcher
        .invoke(&natives.add_int, &[40.into(), 2.into()])?
        .try_into()?;
    info!("Native add int: {sum}");

    info!("Native calls static methods:");
    dispatcher.invoke(&natives.call_static_methods, &[])?;

    for add_i in [true, false] {
        let result: i32 = dispatcher
            .invoke(&natives.mixed_arguments, &[add_i.into(), 2.into()])?
            .try_into()?;
        info!("Native mixedArguments({add_i}, 2) through V: {result}");
    }

    info!("Native calls object methods:");
    let object = VObject::new()?;
    dispatcher.invoke(&natives.call_object_methods, &[object.to_ref().into()])?;
    info!("Object int after native call: {}", object.int_test());

    match dispatcher.invoke(&natives.unimplemented, &[]) {
        Err(InvocationError::Unresolved(err)) => {
            info!("{err}");
            info!("Unresolved entry point example - no worries");
        }
        Err(err) => return Err(err.into()),
        Ok(value) => warn!("'unimplemented_in_v' unexpectedly returned {value:?}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crosscall_boundary::{Registry, RegistryConfig, StaticLoader, Value};
    use crosscall_demo_native::{module, MODULE_NAME};

    use super::{run, Natives};
    use crate::managed::{dispatcher, VObject};

    fn in_process_dispatcher() -> crosscall_boundary::Dispatcher {
        let registry = Registry::with_loaders(
            RegistryConfig::default(),
            vec![Box::new(StaticLoader::new().with_module(module()))],
        );
        registry.load(MODULE_NAME).unwrap();
        dispatcher(Arc::new(registry)).unwrap()
    }

    #[test]
    fn test_grab_bag_survives_unresolved_entry_point() {
        let dispatcher = in_process_dispatcher();
        run(&dispatcher).unwrap();
        // A second run hits the cached failure and still completes.
        run(&dispatcher).unwrap();
    }

    #[test]
    fn test_mixed_arguments_through_native_callback() {
        let dispatcher = in_process_dispatcher();
        let natives = Natives::new().unwrap();
        let call = |add_i: bool| {
            dispatcher
                .invoke(&natives.mixed_arguments, &[add_i.into(), 2.into()])
                .unwrap()
        };
        assert_eq!(call(true), Value::I32(42));
        assert_eq!(call(false), Value::I32(40));
    }

    #[test]
    fn test_object_methods_set_int() {
        let dispatcher = in_process_dispatcher();
        let natives = Natives::new().unwrap();
        let object = VObject::new().unwrap();
        dispatcher
            .invoke(&natives.call_object_methods, &[object.to_ref().into()])
            .unwrap();
        assert_eq!(object.int_test(), 42);
    }
}
