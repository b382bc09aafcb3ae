use crate::shared::ids::EntityId;

/// What the operator currently has focused.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    None,
    Entity(EntityId),
    Step(EntityId, usize),
}

/// One of the three panes. Only meaningful under a narrow viewport, where
/// a single pane is shown at a time; wide layouts show all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    EntityList,
    StepList,
    ConfigEditor,
}

/// Entity/step focus plus the responsive view dimension. Loads are guarded
/// so a selection click during an in-progress fetch is ignored instead of
/// racing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionState {
    focus: Focus,
    narrow: bool,
    pane: Pane,
    loading: Option<EntityId>,
}

impl SelectionState {
    pub fn new(narrow: bool) -> Self {
        Self {
            focus: Focus::None,
            narrow,
            pane: Pane::EntityList,
            loading: None,
        }
    }

    pub fn focus(&self) -> &Focus {
        &self.focus
    }

    pub fn entity(&self) -> Option<&EntityId> {
        match &self.focus {
            Focus::None => None,
            Focus::Entity(id) | Focus::Step(id, _) => Some(id),
        }
    }

    pub fn step(&self) -> Option<usize> {
        match &self.focus {
            Focus::Step(_, index) => Some(*index),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_some()
    }

    /// Active pane under a narrow viewport; wide layouts show everything.
    pub fn pane(&self) -> Option<Pane> {
        self.narrow.then_some(self.pane)
    }

    /// Returns false when a load is already running; the caller must not
    /// start a second fetch.
    pub fn begin_load(&mut self, entity_id: &EntityId) -> bool {
        if self.loading.is_some() {
            return false;
        }
        self.loading = Some(entity_id.clone());
        true
    }

    /// A finished load moves focus to the entity, auto-advancing to the
    /// step when exactly one is eligible for default focus and the layout
    /// has room for the editor.
    pub fn finish_load(&mut self, entity_id: EntityId, eligible_steps: &[usize]) {
        self.loading = None;
        if !self.narrow && eligible_steps.len() == 1 {
            self.focus = Focus::Step(entity_id, eligible_steps[0]);
            self.pane = Pane::ConfigEditor;
        } else {
            self.focus = Focus::Entity(entity_id);
            self.pane = Pane::StepList;
        }
    }

    /// A failed load leaves focus where it was.
    pub fn fail_load(&mut self) {
        self.loading = None;
    }

    /// Requires an entity focus; returns false otherwise.
    pub fn select_step(&mut self, index: usize) -> bool {
        let entity = match &self.focus {
            Focus::None => return false,
            Focus::Entity(id) | Focus::Step(id, _) => id.clone(),
        };
        self.focus = Focus::Step(entity, index);
        self.pane = Pane::ConfigEditor;
        true
    }

    /// Resize recomputes the view from focus without touching selection.
    pub fn set_narrow(&mut self, narrow: bool) {
        self.narrow = narrow;
        self.pane = match &self.focus {
            Focus::None => Pane::EntityList,
            Focus::Entity(_) => Pane::StepList,
            Focus::Step(_, _) => Pane::ConfigEditor,
        };
    }

    /// Narrow-mode back navigation: editor -> steps -> entities. Focus is
    /// kept; only the pane walks back.
    pub fn back(&mut self) {
        self.pane = match self.pane {
            Pane::ConfigEditor => Pane::StepList,
            Pane::StepList | Pane::EntityList => Pane::EntityList,
        };
    }
}
