//! Keyboard shortcut labels shown in the footer.

pub const QUIT: &str = "Esc";
pub const NEXT_FIELD: &str = "Tab";
pub const SUBMIT: &str = "Enter";
pub const MOVE: &str = "Up/Down";
pub const COPY_USERNAME: &str = "Ctrl+U";
pub const COPY_PASSWORD: &str = "Ctrl+P";
pub const REFRESH: &str = "Ctrl+R";
pub const CLEAR: &str = "Ctrl+W";
pub const SIGN_OUT: &str = "Ctrl+L";
pub const THEME: &str = "F2";
