use std::{
    cell::RefCell,
    collections::HashMap,
    ffi::c_void,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use log::{debug, warn};

use crate::{
    abi::{
        RawHost, RawText, RawValue, RawValueError, CALLBACK_FAILED, CALLBACK_NO_SUCH_CLASS,
        CALLBACK_NO_SUCH_METHOD, CALLBACK_OK, CALLBACK_SIGNATURE_MISMATCH,
        CALLBACK_UNKNOWN_OBJECT, STATUS_OK, TAG_BOOL, TAG_F32, TAG_F64, TAG_HANDLE, TAG_I32,
        TAG_I64, TAG_OBJECT, TAG_TEXT, TAG_VOID,
    },
    CallSite, CallbackError, EntryPoint, InvocationError, ManagedClass, MethodDescriptor,
    NativeHandle, ObjectRef, Registry, Signature, SignatureError, Value,
};

/// Typed declaration of a native entry point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Declaration {
    name: String,
    signature: Signature,
}

impl Declaration {
    pub fn new(name: &str, signature: Signature) -> Self {
        Self {
            name: name.into(),
            signature,
        }
    }

    pub fn parse(name: &str, descriptor: &str) -> Result<Self, SignatureError> {
        Ok(Self::new(name, Signature::parse(descriptor)?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

/// Invokes native entry points declared by the host and serves the callbacks
/// native code makes into host classes during those invocations.
pub struct Dispatcher {
    registry: Arc<Registry>,
    classes: HashMap<String, Arc<dyn ManagedClass>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            classes: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Makes static methods of the class callable from native code.
    pub fn register_class(&mut self, class: Arc<dyn ManagedClass>) {
        let name = class.descriptor().name().to_owned();
        if self.classes.insert(name.clone(), class).is_some() {
            warn!("Replacing previously registered class '{name}'");
        }
    }

    /// Invokes the entry point, resolving it on first use.
    ///
    /// Panics if `args` or the returned value do not match the declaration.
    pub fn invoke(&self, declaration: &Declaration, args: &[Value]) -> Result<Value, InvocationError> {
        if let Err(mismatch) = declaration.signature().check_args(args) {
            panic!(
                "Invalid arguments for native entry point '{}' {}: {mismatch}",
                declaration.name(),
                declaration.signature()
            );
        }
        let entry = self.registry.resolve(declaration.name())?;
        debug!(
            "Invoking '{}' {} in module '{}'",
            entry.name(),
            declaration.signature(),
            entry.module()
        );

        let context = CallContext::new(self, &entry);
        let raw_args: Vec<RawValue> = args.iter().map(|a| context.marshal(a)).collect();
        let host = context.raw_host();
        let mut out = RawValue::VOID;
        let status =
            unsafe { (entry.function())(&host, raw_args.as_ptr(), raw_args.len(), &mut out) };

        if status != STATUS_OK {
            let message = out
                .as_text()
                .and_then(|text| unsafe { text.as_str() }.ok())
                .map(str::to_owned)
                .unwrap_or_else(|| format!("native code returned status {status}"));
            warn!("Native entry point '{}' faulted: {message}", entry.name());
            return Err(InvocationError::NativeFault {
                entry_point: entry.name().into(),
                message,
            });
        }

        let value = unsafe { context.unmarshal(&out) }.map_err(|e| {
            InvocationError::NativeFault {
                entry_point: entry.name().into(),
                message: e.to_string(),
            }
        })?;
        if let Err(mismatch) = declaration.signature().check_return(&value) {
            panic!(
                "Native entry point '{}' {} returned unexpected value: {mismatch}",
                declaration.name(),
                declaration.signature()
            );
        }
        Ok(value)
    }
}

// State of one invocation, reachable from native code through `RawHost::context`.
// Lives on the invoking thread's stack for the duration of the call.
struct CallContext<'a> {
    dispatcher: &'a Dispatcher,
    entry: &'a EntryPoint,
    objects: RefCell<Vec<ObjectRef>>,
    // Text handed to native code that must outlive the callback returning it.
    retained: RefCell<Vec<Box<str>>>,
}

impl<'a> CallContext<'a> {
    fn new(dispatcher: &'a Dispatcher, entry: &'a EntryPoint) -> Self {
        Self {
            dispatcher,
            entry,
            objects: RefCell::new(Vec::new()),
            retained: RefCell::new(Vec::new()),
        }
    }

    fn raw_host(&self) -> RawHost {
        RawHost {
            context: self as *const Self as *mut c_void,
            call_static: host_call_static,
            call_method: host_call_method,
            log: host_log,
        }
    }

    fn site(&self) -> CallSite {
        CallSite {
            entry_point: self.entry.name(),
            module: self.entry.module(),
        }
    }

    /// Text is borrowed from `value`.
    fn marshal(&self, value: &Value) -> RawValue {
        match value {
            Value::Void => RawValue::VOID,
            Value::Bool(v) => RawValue::from_bool(*v),
            Value::I32(v) => RawValue::from_i32(*v),
            Value::I64(v) => RawValue::from_i64(*v),
            Value::F32(v) => RawValue::from_f32(*v),
            Value::F64(v) => RawValue::from_f64(*v),
            Value::String(v) => RawValue::from_text(RawText::borrowed(v)),
            Value::Handle(v) => RawValue::from_handle(*v),
            Value::Object(v) => {
                let mut objects = self.objects.borrow_mut();
                let id = match objects.iter().position(|o| o == v) {
                    Some(index) => index,
                    None => {
                        objects.push(v.clone());
                        objects.len() - 1
                    }
                };
                RawValue::from_object(crate::abi::ObjectId(id as u64))
            }
        }
    }

    /// Text is kept alive until the invocation returns.
    fn marshal_retained(&self, value: Value) -> RawValue {
        match value {
            Value::String(text) => self.retain_text(text),
            value => self.marshal(&value),
        }
    }

    fn retain_text(&self, text: String) -> RawValue {
        let text = text.into_boxed_str();
        let raw = RawValue::from_text(RawText::borrowed(&text));
        self.retained.borrow_mut().push(text);
        raw
    }

    unsafe fn unmarshal(&self, raw: &RawValue) -> Result<Value, RawValueError> {
        Ok(match raw.tag {
            TAG_VOID => Value::Void,
            TAG_BOOL => Value::Bool(raw.payload.boolean != 0),
            TAG_I32 => Value::I32(raw.payload.int32),
            TAG_I64 => Value::I64(raw.payload.int64),
            TAG_F32 => Value::F32(raw.payload.float32),
            TAG_F64 => Value::F64(raw.payload.float64),
            TAG_TEXT => Value::String(raw.payload.text.as_str()?.to_owned()),
            TAG_HANDLE => Value::Handle(NativeHandle::from_bits(raw.payload.handle)),
            TAG_OBJECT => Value::Object(self.object(raw.payload.object)?),
            tag => return Err(RawValueError::UnknownTag(tag)),
        })
    }

    unsafe fn unmarshal_args(
        &self,
        args: *const RawValue,
        argc: usize,
    ) -> Result<Vec<Value>, CallbackError> {
        if argc == 0 {
            return Ok(Vec::new());
        }
        if args.is_null() {
            return Err(CallbackError::Failed("null argument pointer".into()));
        }
        std::slice::from_raw_parts(args, argc)
            .iter()
            .map(|raw| self.unmarshal(raw))
            .collect::<Result<_, _>>()
            .map_err(|e| match e {
                RawValueError::UnknownObject(id) => CallbackError::UnknownObject(format!("#{id}")),
                e => CallbackError::Failed(e.to_string()),
            })
    }

    fn object(&self, id: u64) -> Result<ObjectRef, RawValueError> {
        self.objects
            .borrow()
            .get(id as usize)
            .cloned()
            .ok_or(RawValueError::UnknownObject(id))
    }

    fn check_call(
        method: &MethodDescriptor,
        args: &[Value],
    ) -> Result<(), CallbackError> {
        method
            .signature
            .check_args(args)
            .map_err(|mismatch| CallbackError::SignatureMismatch {
                method: method.name.clone(),
                reason: mismatch.to_string(),
            })
    }

    fn check_result(method: &MethodDescriptor, value: &Value) -> Result<(), CallbackError> {
        method
            .signature
            .check_return(value)
            .map_err(|mismatch| CallbackError::SignatureMismatch {
                method: method.name.clone(),
                reason: mismatch.to_string(),
            })
    }

    fn call_static(&self, class: &str, method: &str, args: Vec<Value>) -> Result<Value, CallbackError> {
        let managed = self
            .dispatcher
            .classes
            .get(class)
            .ok_or_else(|| CallbackError::NoSuchClass(class.into()))?;
        let descriptor = managed.descriptor().static_method(method).ok_or_else(|| {
            CallbackError::NoSuchMethod {
                class: class.into(),
                method: method.into(),
            }
        })?;
        Self::check_call(descriptor, &args)?;
        let result = managed.invoke_static(&self.site(), method, &args)?;
        Self::check_result(descriptor, &result)?;
        Ok(result)
    }

    fn call_method(&self, object: u64, method: &str, args: Vec<Value>) -> Result<Value, CallbackError> {
        let object = self
            .object(object)
            .map_err(|_| CallbackError::UnknownObject(format!("#{object}")))?;
        let descriptor = object
            .object()
            .descriptor()
            .instance_method(method)
            .ok_or_else(|| CallbackError::NoSuchMethod {
                class: object.class_name().into(),
                method: method.into(),
            })?;
        Self::check_call(descriptor, &args)?;
        let result = object.object().invoke(&self.site(), method, &args)?;
        Self::check_result(descriptor, &result)?;
        Ok(result)
    }

    unsafe fn complete_callback<F>(&self, out: *mut RawValue, callback: F) -> i32
    where
        F: FnOnce() -> Result<Value, CallbackError>,
    {
        let result = match panic::catch_unwind(AssertUnwindSafe(callback)) {
            Ok(result) => result,
            Err(_) => Err(CallbackError::Failed("host callback panicked".into())),
        };
        let (status, value) = match result {
            Ok(value) => (CALLBACK_OK, self.marshal_retained(value)),
            Err(error) => {
                warn!(
                    "Host callback from '{}' failed: {error}",
                    self.entry.name()
                );
                let status = match error {
                    CallbackError::NoSuchClass(_) => CALLBACK_NO_SUCH_CLASS,
                    CallbackError::NoSuchMethod { .. } => CALLBACK_NO_SUCH_METHOD,
                    CallbackError::SignatureMismatch { .. } => CALLBACK_SIGNATURE_MISMATCH,
                    CallbackError::UnknownObject(_) => CALLBACK_UNKNOWN_OBJECT,
                    CallbackError::Failed(_) => CALLBACK_FAILED,
                };
                let message = match error {
                    CallbackError::SignatureMismatch { reason, .. } => reason,
                    CallbackError::UnknownObject(reason) => reason,
                    CallbackError::Failed(reason) => reason,
                    error => error.to_string(),
                };
                (status, self.retain_text(message))
            }
        };
        if !out.is_null() {
            *out = value;
        }
        status
    }
}

unsafe fn text_arg<'a>(text: RawText, what: &str) -> Result<&'a str, CallbackError> {
    text.as_str()
        .map_err(|_| CallbackError::Failed(format!("{what} is not valid UTF-8")))
}

unsafe extern "C" fn host_call_static(
    context: *mut c_void,
    class: RawText,
    method: RawText,
    args: *const RawValue,
    argc: usize,
    out: *mut RawValue,
) -> i32 {
    let context = &*(context as *const CallContext);
    context.complete_callback(out, || {
        let class = text_arg(class, "class name")?;
        let method = text_arg(method, "method name")?;
        let args = context.unmarshal_args(args, argc)?;
        context.call_static(class, method, args)
    })
}

unsafe extern "C" fn host_call_method(
    context: *mut c_void,
    object: u64,
    method: RawText,
    args: *const RawValue,
    argc: usize,
    out: *mut RawValue,
) -> i32 {
    let context = &*(context as *const CallContext);
    context.complete_callback(out, || {
        let method = text_arg(method, "method name")?;
        let args = context.unmarshal_args(args, argc)?;
        context.call_method(object, method, args)
    })
}

unsafe extern "C" fn host_log(context: *mut c_void, level: u32, message: RawText) {
    let context = &*(context as *const CallContext);
    let level = match level {
        1 => log::Level::Error,
        2 => log::Level::Warn,
        3 => log::Level::Info,
        4 => log::Level::Debug,
        _ => log::Level::Trace,
    };
    let message = message.as_str().unwrap_or("<invalid UTF-8>");
    let target = format!("native::{}", context.entry.module());
    log::log!(target: &target, level, "{}: {message}", context.entry.name());
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicI32, Ordering},
        Arc, Mutex,
    };

    use super::{Declaration, Dispatcher};
    use crate::{
        abi::{run_entry, NativeValue, RawHost, RawValue},
        CallSite, CallbackError, ClassDescriptor, InvocationError, ManagedClass, ManagedObject,
        NativeHandle, ObjectRef, Registry, RegistryConfig, ResolutionError, StaticLoader,
        StaticModule, Value,
    };

    unsafe extern "C" fn add(
        host: *const RawHost,
        args: *const RawValue,
        argc: usize,
        out: *mut RawValue,
    ) -> i32 {
        run_entry(host, args, argc, out, |call| {
            Ok(NativeValue::I32(call.i32_arg(0)?.wrapping_add(call.i32_arg(1)?)))
        })
    }

    unsafe extern "C" fn echo(
        host: *const RawHost,
        args: *const RawValue,
        argc: usize,
        out: *mut RawValue,
    ) -> i32 {
        run_entry(host, args, argc, out, |call| {
            Ok(NativeValue::Text(format!("echo: {}", call.text_arg(0)?)))
        })
    }

    unsafe extern "C" fn fail(
        host: *const RawHost,
        args: *const RawValue,
        argc: usize,
        out: *mut RawValue,
    ) -> i32 {
        run_entry(host, args, argc, out, |_| Err("broken".into()))
    }

    unsafe extern "C" fn explode(
        host: *const RawHost,
        args: *const RawValue,
        argc: usize,
        out: *mut RawValue,
    ) -> i32 {
        run_entry(host, args, argc, out, |_| panic!("boom"))
    }

    unsafe extern "C" fn handle_round_trip(
        host: *const RawHost,
        args: *const RawValue,
        argc: usize,
        out: *mut RawValue,
    ) -> i32 {
        run_entry(host, args, argc, out, |call| {
            Ok(NativeValue::Handle(call.handle_arg(0)?))
        })
    }

    // Calls Host.greet(text) and Host.twice(i32), returns combined text.
    unsafe extern "C" fn call_host(
        host: *const RawHost,
        args: *const RawValue,
        argc: usize,
        out: *mut RawValue,
    ) -> i32 {
        run_entry(host, args, argc, out, |call| {
            let greeting = call.call_static("Host", "greet", &[NativeValue::Text("native".into())])?;
            let twice = call.call_static("Host", "twice", &[NativeValue::I32(21)])?;
            call.log(log::Level::Info, "called host");
            Ok(NativeValue::Text(format!("{greeting:?} {twice:?}")))
        })
    }

    // Reports callback failures as text instead of faulting.
    unsafe extern "C" fn call_host_badly(
        host: *const RawHost,
        args: *const RawValue,
        argc: usize,
        out: *mut RawValue,
    ) -> i32 {
        run_entry(host, args, argc, out, |call| {
            let results = [
                call.call_static("Missing", "greet", &[]),
                call.call_static("Host", "missing", &[]),
                call.call_static("Host", "twice", &[NativeValue::Text("x".into())]),
                call.call_static("Host", "fail", &[]),
            ];
            let descriptions: Vec<String> = results
                .iter()
                .map(|r| match r {
                    Err(CallbackError::NoSuchClass(_)) => "class".to_string(),
                    Err(CallbackError::NoSuchMethod { .. }) => "method".to_string(),
                    Err(CallbackError::SignatureMismatch { .. }) => "mismatch".to_string(),
                    Err(CallbackError::Failed(m)) => format!("failed({m})"),
                    other => format!("{other:?}"),
                })
                .collect();
            Ok(NativeValue::Text(descriptions.join(",")))
        })
    }

    unsafe extern "C" fn set_on_object(
        host: *const RawHost,
        args: *const RawValue,
        argc: usize,
        out: *mut RawValue,
    ) -> i32 {
        run_entry(host, args, argc, out, |call| {
            let object = call.object_arg(0)?;
            call.call_method(object, "setInt", &[NativeValue::I32(42)])?;
            Ok(NativeValue::Void)
        })
    }

    struct Host(ClassDescriptor);

    impl ManagedClass for Host {
        fn descriptor(&self) -> &ClassDescriptor {
            &self.0
        }

        fn invoke_static(
            &self,
            site: &CallSite,
            method: &str,
            args: &[Value],
        ) -> Result<Value, CallbackError> {
            match (method, args) {
                ("greet", [Value::String(who)]) => {
                    Ok(format!("hello {who} from {}", site.entry_point).into())
                }
                ("twice", [Value::I32(v)]) => Ok((v * 2).into()),
                ("fail", []) => Err(CallbackError::Failed("nope".into())),
                _ => Err(CallbackError::NoSuchMethod {
                    class: "Host".into(),
                    method: method.into(),
                }),
            }
        }
    }

    struct IntBox {
        descriptor: ClassDescriptor,
        value: AtomicI32,
    }

    impl ManagedObject for IntBox {
        fn descriptor(&self) -> &ClassDescriptor {
            &self.descriptor
        }

        fn invoke(&self, _: &CallSite, method: &str, args: &[Value]) -> Result<Value, CallbackError> {
            match (method, args) {
                ("setInt", [Value::I32(v)]) => {
                    self.value.store(*v, Ordering::SeqCst);
                    Ok(Value::Void)
                }
                _ => Err(CallbackError::Failed(method.into())),
            }
        }
    }

    fn dispatcher() -> Dispatcher {
        let module = StaticModule::new("test")
            .with_entry("add", add)
            .with_entry("echo", echo)
            .with_entry("fail", fail)
            .with_entry("explode", explode)
            .with_entry("handle_round_trip", handle_round_trip)
            .with_entry("call_host", call_host)
            .with_entry("call_host_badly", call_host_badly)
            .with_entry("set_on_object", set_on_object);
        let loader = StaticLoader::new().with_module(module);
        let registry = Arc::new(Registry::with_loaders(
            RegistryConfig::default(),
            vec![Box::new(loader)],
        ));
        registry.load("test").unwrap();
        let mut dispatcher = Dispatcher::new(registry);
        dispatcher.register_class(Arc::new(Host(
            ClassDescriptor::new("Host")
                .with_static_method("greet", "(T)T")
                .unwrap()
                .with_static_method("twice", "(I)I")
                .unwrap()
                .with_static_method("fail", "()V")
                .unwrap(),
        )));
        dispatcher
    }

    fn declare(name: &str, descriptor: &str) -> Declaration {
        Declaration::parse(name, descriptor).unwrap()
    }

    #[test]
    fn test_invoke_scalars_and_text() {
        let d = dispatcher();
        let r = d.invoke(&declare("add", "(II)I"), &[i32::MAX.into(), 1.into()]);
        assert_eq!(r, Ok(Value::I32(i32::MIN)));
        let r = d.invoke(&declare("echo", "(T)T"), &["héllo".into()]);
        assert_eq!(r, Ok(Value::String("echo: héllo".into())));
        let handle = NativeHandle::from_bits(0x1234_0000_0001);
        let r = d.invoke(&declare("handle_round_trip", "(H)H"), &[handle.into()]);
        assert_eq!(r, Ok(Value::Handle(handle)));
    }

    #[test]
    fn test_unresolved_does_not_prevent_later_calls() {
        let d = dispatcher();
        let r = d.invoke(&declare("unimplemented", "()V"), &[]);
        assert_eq!(
            r,
            Err(InvocationError::Unresolved(ResolutionError::NotFound {
                name: "unimplemented".into()
            }))
        );
        let r = d.invoke(&declare("add", "(II)I"), &[40.into(), 2.into()]);
        assert_eq!(r, Ok(Value::I32(42)));
    }

    #[test]
    fn test_native_fault() {
        let d = dispatcher();
        let r = d.invoke(&declare("fail", "()V"), &[]);
        assert_eq!(
            r,
            Err(InvocationError::NativeFault {
                entry_point: "fail".into(),
                message: "broken".into()
            })
        );
        match d.invoke(&declare("explode", "()V"), &[]) {
            Err(InvocationError::NativeFault { message, .. }) => assert!(message.contains("boom")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    #[should_panic(expected = "Invalid arguments")]
    fn test_argument_mismatch_panics() {
        let d = dispatcher();
        let _ = d.invoke(&declare("add", "(II)I"), &[1.into()]);
    }

    #[test]
    #[should_panic(expected = "returned unexpected value")]
    fn test_return_mismatch_panics() {
        let d = dispatcher();
        let _ = d.invoke(&declare("add", "(II)J"), &[1.into(), 2.into()]);
    }

    #[test]
    fn test_static_callbacks() {
        let _ = simple_logger::init_with_level(log::Level::Debug);
        let d = dispatcher();
        let r = d.invoke(&declare("call_host", "()T"), &[]).unwrap();
        assert_eq!(
            r,
            Value::String("Text(\"hello native from call_host\") I32(42)".into())
        );
    }

    #[test]
    fn test_callback_errors_are_reported_to_native_code() {
        let d = dispatcher();
        let r = d.invoke(&declare("call_host_badly", "()T"), &[]).unwrap();
        assert_eq!(r, Value::String("class,method,mismatch,failed(nope)".into()));
    }

    #[test]
    fn test_object_callbacks() {
        let d = dispatcher();
        let object = Arc::new(IntBox {
            descriptor: ClassDescriptor::new("IntBox")
                .with_instance_method("setInt", "(I)V")
                .unwrap(),
            value: AtomicI32::new(0),
        });
        let r = d.invoke(
            &declare("set_on_object", "(O)V"),
            &[ObjectRef::new(object.clone()).into()],
        );
        assert_eq!(r, Ok(Value::Void));
        assert_eq!(object.value.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_concurrent_invocations() {
        let d = Arc::new(dispatcher());
        let results = Arc::new(Mutex::new(Vec::new()));
        let threads: Vec<_> = (0..4)
            .map(|i| {
                let d = d.clone();
                let results = results.clone();
                std::thread::spawn(move || {
                    let r = d.invoke(&declare("add", "(II)I"), &[i.into(), 1.into()]);
                    results.lock().unwrap().push(r.unwrap());
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        let mut results = results.lock().unwrap().clone();
        results.sort_by_key(|v| i32::try_from(v.clone()).unwrap());
        assert_eq!(results, vec![1.into(), 2.into(), 3.into(), 4.into()]);
    }
}
