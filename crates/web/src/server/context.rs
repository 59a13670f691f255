//! Per-request context threaded through the pipeline stages.
//!
//! The session stage inserts one [`RequestContext`] into the request
//! extensions; later stages mutate its fields in place and handlers read it
//! with `Extension<RequestContext>`.

use common::{Identity, ViewContext};

use crate::session::Session;

/// Mutable per-request state owned by a single request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub session: Session,
    identity: Option<Identity>,
    identity_resolved: bool,
    /// Values rendered into every view for this request.
    pub view: ViewContext,
    /// Decoded form-encoded request body; empty for other requests.
    pub form: FormBody,
}

impl RequestContext {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            identity: None,
            identity_resolved: false,
            view: ViewContext::new(),
            form: FormBody::default(),
        }
    }

    /// The signed-in user, `None` for anonymous requests.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn identity_resolved(&self) -> bool {
        self.identity_resolved
    }

    /// Record the outcome of identity resolution. Later calls are ignored.
    pub fn resolve_identity(&mut self, identity: Option<Identity>) {
        if !self.identity_resolved {
            self.identity = identity;
            self.identity_resolved = true;
        }
    }

    /// Copy the identity (or the no-user marker) into the view context.
    pub fn publish_user(&mut self) {
        self.view.set_user(self.identity.as_ref());
    }

    /// The request's view context extended with handler-specific values.
    pub fn view_with(&self, locals: ViewContext) -> ViewContext {
        let mut view = self.view.clone();
        view.extend(locals);
        view
    }
}

/// Decoded `application/x-www-form-urlencoded` fields, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormBody(Vec<(String, String)>);

impl FormBody {
    /// First value submitted for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First value for `name` with surrounding whitespace removed; empty
    /// when absent.
    pub fn trimmed(&self, name: &str) -> &str {
        self.get(name).map(str::trim).unwrap_or_default()
    }
}

impl From<Vec<(String, String)>> for FormBody {
    fn from(fields: Vec<(String, String)>) -> Self {
        Self(fields)
    }
}
