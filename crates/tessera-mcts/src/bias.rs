// ---------------------------------------------------------------------------
// BiasTerm — UCT exploration bonus
// ---------------------------------------------------------------------------

/// Exploration term `C * sqrt(ln(parent_count) / child_count)`.
///
/// `ln(parent_count)` is computed once per selection step via
/// `start_iteration`, not once per child.
#[derive(Clone, Copy, Debug)]
pub struct BiasTerm {
    constant: f32,
    log_parent_count: f32,
}

impl BiasTerm {
    pub fn new(constant: f32) -> Self {
        Self {
            constant,
            log_parent_count: 0.0,
        }
    }

    pub fn constant(&self) -> f32 {
        self.constant
    }

    pub fn set_constant(&mut self, constant: f32) {
        self.constant = constant;
    }

    /// Cache `ln(parent_count)` for the children of one node.
    pub fn start_iteration(&mut self, parent_count: f32) {
        if self.constant != 0.0 {
            self.log_parent_count = parent_count.max(1.0).ln();
        }
    }

    /// Bias for a child with the given count. Unvisited children get an
    /// infinite bonus so they are tried before revisiting siblings.
    pub fn get(&self, child_count: f32) -> f32 {
        if self.constant == 0.0 {
            return 0.0;
        }
        if child_count == 0.0 {
            return f32::INFINITY;
        }
        self.constant * (self.log_parent_count / child_count).sqrt()
    }
}
