//! Action set creation and per-frame input synchronization

use crate::action::{Action, ActionKind, ActionSet, ActionState};
use crate::error::{RuntimeCheck, XrError, XrResult};
use crate::runtime::{ActionHandle, ActionSetHandle, SpaceHandle};

use super::{live, SessionService};

pub(super) struct BoundAction {
    name: String,
    kind: ActionKind,
    handle: ActionHandle,
    /// Pose actions are located through their own space
    space: Option<SpaceHandle>,
}

pub(super) struct BoundActionSet {
    pub(super) name: String,
    pub(super) handle: ActionSetHandle,
    actions: Vec<BoundAction>,
    pub(super) snapshot: ActionSet,
}

impl SessionService<'_> {
    /// Create action sets, suggest bindings and attach them to the session
    pub(super) fn setup_actions(&mut self) -> XrResult<()> {
        let config = self.config;
        if config.action_sets.is_empty() {
            log::info!("no action sets");
            return Ok(());
        }

        let profile = config.interaction_profile;
        let session = live(&mut self.session)?;
        let mut bindings = Vec::with_capacity(config.action_count());

        for set_spec in &config.action_sets {
            let handle = session
                .create_action_set(&set_spec.name, &set_spec.description, set_spec.priority)
                .check()?;

            let mut bound = BoundActionSet {
                name: set_spec.name.clone(),
                handle,
                actions: Vec::with_capacity(set_spec.actions.len()),
                snapshot: ActionSet::new(set_spec.name.clone()),
            };

            for spec in &set_spec.actions {
                let kind = spec.binding.kind();
                let path = profile.path(&spec.binding)?;
                let action = session
                    .create_action(handle, &spec.name, &spec.description, kind)
                    .check()?;
                let space = match kind {
                    ActionKind::Pose => Some(session.create_action_space(action).check()?),
                    _ => None,
                };

                bindings.push((action, path));
                bound.snapshot.insert(Action::new(spec.name.clone(), kind));
                bound.actions.push(BoundAction {
                    name: spec.name.clone(),
                    kind,
                    handle: action,
                    space,
                });
            }

            self.action_sets.push(bound);
        }

        session
            .suggest_bindings(profile.profile_path(), &bindings)
            .check()?;

        let handles: Vec<ActionSetHandle> = self.action_sets.iter().map(|s| s.handle).collect();
        session.attach_action_sets(&handles).check()?;

        log::info!(
            "{} action sets with {} actions attached for {}",
            handles.len(),
            bindings.len(),
            profile.profile_path()
        );
        Ok(())
    }

    /// Refresh action values, hand them to the renderer and issue its haptics
    pub(super) fn sync_actions(&mut self) -> XrResult<()> {
        if self.action_sets.is_empty() {
            return Ok(());
        }

        let selector = self.renderer.active_action_sets();
        let active: Vec<ActionSetHandle> = self
            .action_sets
            .iter()
            .filter(|s| selector.includes(&s.name))
            .map(|s| s.handle)
            .collect();

        let tracking_space = self.tracking_space;
        let time = self.frame_timing.predicted_display_time;
        let session = live(&mut self.session)?;

        if !active.is_empty() {
            session.sync_actions(&active).check()?;
        }

        for set in self.action_sets.iter_mut().filter(|s| selector.includes(&s.name)) {
            for bound in &set.actions {
                if !bound.kind.has_state() {
                    continue;
                }

                let state = session.action_state(bound.handle, bound.kind).check()?;
                let Some(action) = set.snapshot.get_mut(&bound.name) else {
                    continue;
                };

                action.is_active = state.is_active;
                action.changed = state.changed;
                if !state.is_active {
                    // Keep the last known value
                    continue;
                }

                action.value = match bound.space {
                    Some(space) => {
                        let location = session.locate_space(space, tracking_space, time).check()?;
                        ActionState::Pose(location.pose)
                    }
                    None => state.value,
                };
            }
        }

        let snapshots: Vec<ActionSet> = self.action_sets.iter().map(|s| s.snapshot.clone()).collect();
        let requests = self.renderer.set_action_sets(&snapshots);

        for vibrate in requests {
            let bound = self
                .action_sets
                .iter()
                .filter(|s| selector.includes(&s.name))
                .flat_map(|s| s.actions.iter())
                .find(|a| a.kind == ActionKind::Vibration && a.name == vibrate.action)
                .ok_or_else(|| {
                    XrError::UnknownAction(format!("no active vibration action named {}", vibrate.action))
                })?;

            let handle = bound.handle;
            live(&mut self.session)?.apply_haptic(handle, &vibrate).check()?;
        }

        Ok(())
    }
}
