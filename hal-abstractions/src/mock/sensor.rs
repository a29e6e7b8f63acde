//! Mock temperature/humidity sensor

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use crate::sensor::{TempHumiditySensor, TemperatureScale};

#[derive(Debug, Default)]
struct SensorState {
    queue: VecDeque<Option<(f32, f32)>>,
    /// Reading served by the most recent temperature read
    current: Option<(f32, f32)>,
    scales: Vec<TemperatureScale>,
}

/// Sensor double fed from a queue of readings
///
/// Each temperature read takes the next queued reading; the humidity read
/// that follows returns the humidity of that same reading. Once the queue
/// runs dry the last reading repeats.
#[derive(Debug, Clone, Default)]
pub struct MockSensor {
    state: Rc<RefCell<SensorState>>,
}

impl MockSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, t: f32, h: f32) {
        self.state.borrow_mut().queue.push_back(Some((t, h)));
    }

    /// Queue a failed read (both values NaN)
    pub fn push_invalid(&self) {
        self.state.borrow_mut().queue.push_back(None);
    }

    /// Number of temperature reads performed
    pub fn reads(&self) -> usize {
        self.state.borrow().scales.len()
    }

    /// Scales requested, in read order
    pub fn scales(&self) -> Vec<TemperatureScale> {
        self.state.borrow().scales.clone()
    }
}

impl TempHumiditySensor for MockSensor {
    fn read_temperature(&mut self, scale: TemperatureScale) -> f32 {
        let mut state = self.state.borrow_mut();
        state.scales.push(scale);
        if let Some(next) = state.queue.pop_front() {
            state.current = next;
        }
        state.current.map_or(f32::NAN, |(t, _)| t)
    }

    fn read_humidity(&mut self) -> f32 {
        self.state.borrow().current.map_or(f32::NAN, |(_, h)| h)
    }
}
