pub mod guard;

pub use guard::{
    allowed_roles_for, pre_navigation, render_guard, GuardDecision, MaybeSession, LOADING_CAP,
};
