//! Time-step bookkeeping consumed by the temporal schemes.

#[derive(Debug, Clone, PartialEq)]
pub struct TimeState {
    pub value: f64,
    pub delta_t: f64,
    /// Previous step size; equals `delta_t` until the first `advance`.
    pub delta_t0: f64,
    pub time_index: usize,
    pub start_time_index: usize,
    /// Set on the last outer iteration of a time step so `<name>Final`
    /// solver controls and relaxation factors are selected.
    pub final_iteration: bool,
}

impl Default for TimeState {
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}

impl TimeState {
    pub fn new(start: f64, delta_t: f64) -> Self {
        Self {
            value: start,
            delta_t,
            delta_t0: delta_t,
            time_index: 0,
            start_time_index: 0,
            final_iteration: false,
        }
    }

    /// Moves to the next time level with step `delta_t`.
    pub fn advance(&mut self, delta_t: f64) {
        self.delta_t0 = self.delta_t;
        self.delta_t = delta_t;
        self.value += delta_t;
        self.time_index += 1;
    }

    pub fn r_delta_t(&self) -> f64 {
        1.0 / self.delta_t
    }
}
