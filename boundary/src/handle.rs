/// Opaque reference to state owned by native code.
///
/// The host only stores and forwards handles; it never interprets them. Bits
/// are laid out as `generation << 32 | (index + 1)` so that zero is never a
/// live handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(u64);

impl NativeHandle {
    pub const NULL: NativeHandle = NativeHandle(0);

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn to_bits(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    fn new(index: usize, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64 + 1))
    }

    fn index(self) -> Option<usize> {
        let low = (self.0 & 0xffff_ffff) as usize;
        low.checked_sub(1)
    }

    fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl std::fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Generation checked slab used by native code to hand out [`NativeHandle`]s.
///
/// A handle stops resolving once its value is removed, even if the slot is
/// reused afterwards.
pub struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    len: usize,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleTable<T> {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> NativeHandle {
        self.len += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.value = Some(value);
                NativeHandle::new(index, slot.generation)
            }
            None => {
                self.slots.push(Slot {
                    generation: 1,
                    value: Some(value),
                });
                NativeHandle::new(self.slots.len() - 1, 1)
            }
        }
    }

    fn slot(&self, handle: NativeHandle) -> Option<&Slot<T>> {
        let slot = self.slots.get(handle.index()?)?;
        (slot.generation == handle.generation()).then_some(slot)
    }

    pub fn get(&self, handle: NativeHandle) -> Option<&T> {
        self.slot(handle)?.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: NativeHandle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index()?)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn is_live(&self, handle: NativeHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn remove(&mut self, handle: NativeHandle) -> Option<T> {
        let index = handle.index()?;
        let slot = self.slots.get_mut(index)?;
        if slot.generation != handle.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            generation => generation,
        };
        self.free.push(index);
        self.len -= 1;
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
