// SPDX-License-Identifier: MIT

/// Values that are omitted from the wire when they carry no information.
pub trait Empty {
    fn is_empty(&self) -> bool;
}

impl<T> Empty for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

impl Empty for String {
    fn is_empty(&self) -> bool {
        String::is_empty(self)
    }
}

impl<T: Empty> Empty for Option<T> {
    fn is_empty(&self) -> bool {
        self.as_ref().map_or(true, Empty::is_empty)
    }
}

/// Returns `true` if the optional value is present and not empty.
pub(crate) fn is_present<T: Empty>(value: &Option<T>) -> bool {
    !Empty::is_empty(value)
}
