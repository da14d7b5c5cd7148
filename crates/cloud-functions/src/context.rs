/// Authentication attached to an incoming call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerAuth {
    pub uid: String,
    pub email: Option<String>,
}

/// What the platform tells a handler about its caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    pub auth: Option<CallerAuth>,
}

impl CallerContext {
    pub fn anonymous() -> Self {
        Self { auth: None }
    }

    pub fn authenticated(uid: impl Into<String>, email: Option<String>) -> Self {
        Self {
            auth: Some(CallerAuth {
                uid: uid.into(),
                email,
            }),
        }
    }
}
