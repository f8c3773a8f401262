use bitflags::bitflags;

use crate::userauth::Method;

bitflags! {
    /// Set of authentication methods.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Methods: u8 {
        /// The SSH `none` authentication method.
        const NONE = 1 << 0;

        /// The SSH `publickey` authentication method.
        const PUBLICKEY = 1 << 1;

        /// The SSH `password` authentication method.
        const PASSWORD = 1 << 2;

        /// The SSH `hostbased` authentication method.
        const HOSTBASED = 1 << 3;

        /// The SSH `keyboard-interactive` authentication method.
        const KEYBOARD_INTERACTIVE = 1 << 4;
    }
}

impl Methods {
    const NAMES: [(Self, &'static str); 5] = [
        (Self::NONE, "none"),
        (Self::PUBLICKEY, "publickey"),
        (Self::PASSWORD, "password"),
        (Self::HOSTBASED, "hostbased"),
        (Self::KEYBOARD_INTERACTIVE, "keyboard-interactive"),
    ];

    /// The method of wire name `name`, if known.
    pub fn by_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(_, known)| *known == name)
            .map(|(method, _)| *method)
    }

    /// Collect the known methods of a `name-list`, ignoring the unknown ones.
    pub fn from_names<T: AsRef<str>>(names: &[T]) -> Self {
        names
            .iter()
            .filter_map(|name| Self::by_name(name.as_ref()))
            .fold(Self::empty(), |methods, method| methods | method)
    }

    /// The wire name of a single method.
    pub fn name(self) -> Option<&'static str> {
        Self::NAMES
            .iter()
            .find(|(method, _)| *method == self)
            .map(|(_, name)| *name)
    }

    /// The wire names of the methods in the set.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(method, _)| self.contains(*method))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl From<&Method<'_>> for Methods {
    fn from(method: &Method<'_>) -> Self {
        match method {
            Method::None => Self::NONE,
            Method::Publickey { .. } => Self::PUBLICKEY,
            Method::Password { .. } => Self::PASSWORD,
            Method::Hostbased { .. } => Self::HOSTBASED,
            Method::KeyboardInteractive { .. } => Self::KEYBOARD_INTERACTIVE,
        }
    }
}
