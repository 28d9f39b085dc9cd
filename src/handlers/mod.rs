// One module per resource; each exposes its HTTP methods as `get`, `put`, ...
//
// Access checks live in `guard`, payload decoding in `fields`, and request
// helpers (negotiation, absolute URIs, label validation) in `context`.

pub mod context;
pub mod fields;
pub mod guard;
pub mod health;
pub mod login;
pub mod permission;
pub mod project;
pub mod project_list;
pub mod record;
