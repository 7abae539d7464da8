//! Local control state and its wire form

use crate::ws::protocol::{Actions, ClientMsg, Keys};

/// Held controls at the moment of sampling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    pub w: bool,
    pub a: bool,
    pub s: bool,
    pub d: bool,
    pub kick: bool,
}

impl KeyState {
    /// The `inputs` message for this state. Sent every input tick whether or
    /// not anything changed; a lost message is never resent.
    pub fn to_msg(self) -> ClientMsg {
        ClientMsg::Inputs {
            keys: Keys {
                w: self.w,
                a: self.a,
                s: self.s,
                d: self.d,
            },
            actions: Some(Actions { kick: self.kick }),
        }
    }
}

/// Anything that can report which controls are held
pub trait InputSource: Send {
    fn sample(&mut self) -> KeyState;
}

/// Replays a fixed sequence of states, one per sample, looping
#[derive(Debug, Clone)]
pub struct ScriptedInput {
    steps: Vec<KeyState>,
    cursor: usize,
}

impl ScriptedInput {
    pub fn new(steps: Vec<KeyState>) -> Self {
        Self { steps, cursor: 0 }
    }

    /// Walk a square and tap kick at each corner (headless smoke runs)
    pub fn patrol() -> Self {
        let leg = |keys: KeyState| std::iter::repeat(keys).take(30);
        let tap = KeyState {
            kick: true,
            ..KeyState::default()
        };

        let steps = leg(KeyState { d: true, ..KeyState::default() })
            .chain([tap, KeyState::default()])
            .chain(leg(KeyState { s: true, ..KeyState::default() }))
            .chain([tap, KeyState::default()])
            .chain(leg(KeyState { a: true, ..KeyState::default() }))
            .chain([tap, KeyState::default()])
            .chain(leg(KeyState { w: true, ..KeyState::default() }))
            .chain([tap, KeyState::default()])
            .collect();
        Self::new(steps)
    }
}

impl InputSource for ScriptedInput {
    fn sample(&mut self) -> KeyState {
        let Some(state) = self.steps.get(self.cursor).copied() else {
            return KeyState::default();
        };
        self.cursor = (self.cursor + 1) % self.steps.len();
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::encode;

    #[test]
    fn key_state_encodes_as_inputs_message() {
        let state = KeyState {
            w: true,
            d: true,
            kick: true,
            ..KeyState::default()
        };
        let json: serde_json::Value = serde_json::from_str(&encode(&state.to_msg()).unwrap()).unwrap();
        assert_eq!(json["type"], "inputs");
        assert_eq!(json["keys"]["w"], true);
        assert_eq!(json["keys"]["a"], false);
        assert_eq!(json["keys"]["d"], true);
        assert_eq!(json["actions"]["kick"], true);
        assert!(state.to_msg().kick_held());
    }

    #[test]
    fn scripted_input_loops() {
        let up = KeyState {
            w: true,
            ..KeyState::default()
        };
        let mut input = ScriptedInput::new(vec![up, KeyState::default()]);
        assert_eq!(input.sample(), up);
        assert_eq!(input.sample(), KeyState::default());
        assert_eq!(input.sample(), up);
    }

    #[test]
    fn empty_script_is_idle() {
        let mut input = ScriptedInput::new(Vec::new());
        assert_eq!(input.sample(), KeyState::default());
    }

    #[test]
    fn patrol_releases_kick_between_taps() {
        let mut input = ScriptedInput::patrol();
        let samples: Vec<KeyState> = (0..128).map(|_| input.sample()).collect();
        let taps = samples.windows(2).filter(|w| !w[0].kick && w[1].kick).count();
        assert_eq!(taps, 4);
        assert!(samples.windows(2).all(|w| !(w[0].kick && w[1].kick)));
    }
}
