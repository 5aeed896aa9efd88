//! Audio context: a node graph rendered in fixed-size quanta.
//!
//! The context owns every node and the connections between them. Rendering
//! walks the nodes in dependency order; connections into delay nodes are
//! left out of that order because a delay's output for a quantum is read
//! from its line before the quantum is processed. A cycle is therefore legal
//! only if it passes through a delay.

use std::collections::{BTreeMap, HashMap, VecDeque};

use log::{debug, info};

use crate::dsp::RENDER_QUANTUM;
use crate::dsp::convolver::Convolver;
use crate::dsp::oscillator::Waveform;
use crate::dsp::param::AudioParam;
use crate::error::SirenError;

use super::node::{Node, NodeId, OscillatorNode, ParamKind, PlaybackState};

/// Lowest and highest sample rates a context accepts.
pub const MIN_SAMPLE_RATE: f64 = 3000.0;
pub const MAX_SAMPLE_RATE: f64 = 768_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Created but not yet allowed to play (autoplay policy).
    Suspended,
    Running,
}

#[derive(Debug)]
pub struct AudioContext {
    sample_rate: f64,
    max_delay_seconds: f64,
    state: ContextState,
    frame: u64,
    nodes: BTreeMap<NodeId, Node>,
    /// Connections as (source, destination) pairs.
    edges: Vec<(NodeId, NodeId)>,
    destination: NodeId,
    next_id: u64,
    /// Processing order, rebuilt after any topology change.
    order: Option<Vec<NodeId>>,
    outputs: HashMap<NodeId, Vec<f32>>,
    param_scratch: Vec<f64>,
    input_scratch: Vec<f32>,
}

impl AudioContext {
    /// Create a suspended context. Fails when the platform cannot run at
    /// `sample_rate`.
    pub fn new(sample_rate: f64, max_delay_seconds: f64) -> Result<Self, SirenError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(SirenError::ContextUnavailable(format!(
                "sample rate {sample_rate} Hz is outside {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE}"
            )));
        }
        let mut ctx = AudioContext {
            sample_rate,
            max_delay_seconds,
            state: ContextState::Suspended,
            frame: 0,
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            destination: NodeId(0),
            next_id: 0,
            order: None,
            outputs: HashMap::new(),
            param_scratch: vec![0.0; RENDER_QUANTUM],
            input_scratch: vec![0.0; RENDER_QUANTUM],
        };
        ctx.destination = ctx.insert(Node::Destination);
        info!("audio context created at {sample_rate} Hz (suspended)");
        Ok(ctx)
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Context time in seconds; advances only while running.
    pub fn current_time(&self) -> f64 {
        self.frame as f64 / self.sample_rate
    }

    pub fn destination(&self) -> NodeId {
        self.destination
    }

    pub fn resume(&mut self) {
        if self.state == ContextState::Suspended {
            self.state = ContextState::Running;
            info!("audio context resumed");
        }
    }

    fn insert(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        self.order = None;
        id
    }

    pub fn create_oscillator(&mut self) -> NodeId {
        self.insert(Node::Oscillator(OscillatorNode::new(self.sample_rate)))
    }

    pub fn create_gain(&mut self) -> NodeId {
        self.insert(Node::gain())
    }

    pub fn create_delay(&mut self) -> NodeId {
        self.insert(Node::delay(self.sample_rate, self.max_delay_seconds))
    }

    pub fn create_convolver(&mut self) -> NodeId {
        self.insert(Node::Convolver(Box::new(Convolver::new())))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, id: NodeId) -> Result<&Node, SirenError> {
        self.nodes.get(&id).ok_or(SirenError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, SirenError> {
        self.nodes.get_mut(&id).ok_or(SirenError::UnknownNode(id))
    }

    /// Route `src`'s output into `dst`. Connecting twice is a no-op.
    pub fn connect(&mut self, src: NodeId, dst: NodeId) -> Result<(), SirenError> {
        if src == dst || !self.node(src)?.has_output() {
            return Err(SirenError::InvalidConnection(src));
        }
        if !self.node(dst)?.accepts_input() {
            return Err(SirenError::InvalidConnection(dst));
        }
        if !self.edges.contains(&(src, dst)) {
            self.edges.push((src, dst));
            self.order = None;
        }
        Ok(())
    }

    pub fn is_connected(&self, src: NodeId, dst: NodeId) -> bool {
        self.edges.contains(&(src, dst))
    }

    /// Discard a node and all connections touching it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), SirenError> {
        if id == self.destination {
            return Err(SirenError::InvalidState("the destination cannot be removed".into()));
        }
        self.nodes.remove(&id).ok_or(SirenError::UnknownNode(id))?;
        self.edges.retain(|&(s, d)| s != id && d != id);
        self.outputs.remove(&id);
        self.order = None;
        Ok(())
    }

    pub fn param(&self, id: NodeId, kind: ParamKind) -> Result<&AudioParam, SirenError> {
        let node = self.node(id)?;
        let name = node.kind_name();
        node.param(kind)
            .ok_or_else(|| SirenError::InvalidState(format!("{name} node has no {kind:?} parameter")))
    }

    pub fn param_mut(&mut self, id: NodeId, kind: ParamKind) -> Result<&mut AudioParam, SirenError> {
        let node = self.node_mut(id)?;
        let name = node.kind_name();
        node.param_mut(kind)
            .ok_or_else(|| SirenError::InvalidState(format!("{name} node has no {kind:?} parameter")))
    }

    fn oscillator_mut(&mut self, id: NodeId) -> Result<&mut OscillatorNode, SirenError> {
        match self.node_mut(id)? {
            Node::Oscillator(o) => Ok(o),
            other => Err(SirenError::InvalidState(format!("{} node is not an oscillator", other.kind_name()))),
        }
    }

    pub fn set_oscillator_type(&mut self, id: NodeId, waveform: Waveform) -> Result<(), SirenError> {
        self.oscillator_mut(id)?.osc.waveform = waveform;
        Ok(())
    }

    pub fn oscillator_type(&self, id: NodeId) -> Option<Waveform> {
        match self.nodes.get(&id) {
            Some(Node::Oscillator(o)) => Some(o.osc.waveform),
            _ => None,
        }
    }

    pub fn playback_state(&self, id: NodeId) -> Option<PlaybackState> {
        match self.nodes.get(&id) {
            Some(Node::Oscillator(o)) => Some(o.state),
            _ => None,
        }
    }

    /// Start an oscillator. Oscillators can be started once.
    pub fn start(&mut self, id: NodeId) -> Result<(), SirenError> {
        let osc = self.oscillator_mut(id)?;
        if osc.state != PlaybackState::Unstarted {
            return Err(SirenError::InvalidState(format!("oscillator {id:?} was already started")));
        }
        osc.state = PlaybackState::Playing;
        osc.osc.reset();
        Ok(())
    }

    /// Halt an oscillator for good.
    pub fn stop(&mut self, id: NodeId) -> Result<(), SirenError> {
        let osc = self.oscillator_mut(id)?;
        match osc.state {
            PlaybackState::Playing => {
                osc.state = PlaybackState::Stopped;
                Ok(())
            }
            PlaybackState::Unstarted => Err(SirenError::InvalidState(format!("oscillator {id:?} was never started"))),
            PlaybackState::Stopped => Err(SirenError::InvalidState(format!("oscillator {id:?} is already stopped"))),
        }
    }

    pub fn set_impulse_response(&mut self, id: NodeId, impulse: &[f32]) -> Result<(), SirenError> {
        match self.node_mut(id)? {
            Node::Convolver(c) => c.set_impulse_response(impulse),
            other => Err(SirenError::InvalidState(format!("{} node is not a convolver", other.kind_name()))),
        }
    }

    /// Dependency order over the graph with edges into delays removed.
    fn processing_order(&self) -> Result<Vec<NodeId>, SirenError> {
        let mut indegree: BTreeMap<NodeId, usize> = self.nodes.keys().map(|&id| (id, 0)).collect();
        for &(_, dst) in self.ordered_edges() {
            if let Some(d) = indegree.get_mut(&dst) {
                *d += 1;
            }
        }

        let mut ready: VecDeque<NodeId> = indegree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_front() {
            order.push(id);
            for &(_, dst) in self.ordered_edges().filter(|(s, _)| *s == id) {
                if let Some(d) = indegree.get_mut(&dst) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push_back(dst);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(SirenError::CycleWithoutDelay);
        }
        Ok(order)
    }

    fn ordered_edges(&self) -> impl Iterator<Item = &(NodeId, NodeId)> {
        self.edges
            .iter()
            .filter(move |(_, dst)| !matches!(self.nodes.get(dst), Some(Node::Delay(_))))
    }

    fn sum_inputs(&self, id: NodeId, input: &mut [f32]) {
        input.fill(0.0);
        for &(src, _) in self.edges.iter().filter(|(_, d)| *d == id) {
            if let Some(out) = self.outputs.get(&src) {
                for (acc, s) in input.iter_mut().zip(out) {
                    *acc += s;
                }
            }
        }
    }

    /// Whether everything `id` feeds is a gain held at zero for the quantum
    /// starting at `start`.
    fn output_silenced(&self, id: NodeId, start: f64) -> bool {
        let end = start + (RENDER_QUANTUM - 1) as f64 / self.sample_rate;
        self.edges
            .iter()
            .filter(|(src, _)| *src == id)
            .all(|(_, dst)| match self.nodes.get(dst) {
                Some(Node::Gain(g)) => g.is_silent_between(start, end),
                _ => false,
            })
    }

    /// Render one quantum of mono output into `out` (length
    /// [`RENDER_QUANTUM`]). A suspended context renders silence and does not
    /// advance time.
    pub fn render_quantum(&mut self, out: &mut [f32]) -> Result<(), SirenError> {
        debug_assert_eq!(out.len(), RENDER_QUANTUM);
        if self.state != ContextState::Running {
            out.fill(0.0);
            return Ok(());
        }

        let order = match self.order.take() {
            Some(order) => order,
            None => {
                let order = self.processing_order()?;
                debug!("graph order rebuilt: {} nodes, {} connections", order.len(), self.edges.len());
                order
            }
        };
        let mut input = std::mem::take(&mut self.input_scratch);
        let processed = self.process_nodes(&order, &mut input);
        self.order = Some(order);
        self.input_scratch = input;
        processed?;

        match self.outputs.get(&self.destination) {
            Some(mix) => {
                for (o, &s) in out.iter_mut().zip(mix) {
                    *o = soft_clip(s);
                }
            }
            None => out.fill(0.0),
        }

        self.frame += RENDER_QUANTUM as u64;
        let now = self.current_time();
        for node in self.nodes.values_mut() {
            for param in node.params_mut() {
                param.advance_to(now);
            }
        }
        Ok(())
    }

    fn process_nodes(&mut self, order: &[NodeId], input: &mut [f32]) -> Result<(), SirenError> {
        let start = self.current_time();
        let sr = self.sample_rate;

        // Delay outputs come from their lines, before anything else runs.
        for (id, node) in self.nodes.iter() {
            if let Node::Delay(d) = node {
                d.delay_time.fill(start, sr, &mut self.param_scratch);
                let buf = self.outputs.entry(*id).or_insert_with(|| vec![0.0; RENDER_QUANTUM]);
                d.line.read_block(&self.param_scratch, buf);
            }
        }

        for &id in order {
            let silenced = match self.nodes.get(&id) {
                Some(Node::Delay(_)) | None => continue,
                Some(Node::Convolver(_)) => self.output_silenced(id, start),
                Some(_) => false,
            };
            self.sum_inputs(id, input);
            let mut buf = self.outputs.remove(&id).unwrap_or_else(|| vec![0.0; RENDER_QUANTUM]);
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            match node {
                Node::Oscillator(o) => {
                    if o.state == PlaybackState::Playing {
                        o.frequency.fill(start, sr, &mut self.param_scratch);
                        for (s, &f) in buf.iter_mut().zip(&self.param_scratch) {
                            *s = o.osc.next_sample(f) as f32;
                        }
                    } else {
                        buf.fill(0.0);
                    }
                }
                Node::Gain(g) => {
                    g.fill(start, sr, &mut self.param_scratch);
                    for ((s, &x), &gain) in buf.iter_mut().zip(input.iter()).zip(&self.param_scratch) {
                        *s = x * gain as f32;
                    }
                }
                Node::Convolver(c) if silenced => c.rest(&mut buf),
                Node::Convolver(c) => c.process(input, &mut buf)?,
                Node::Destination => buf.copy_from_slice(input),
                Node::Delay(_) => {}
            }
            self.outputs.insert(id, buf);
        }

        // Feed the delays now that all of their sources have run.
        for &id in order {
            if !matches!(self.nodes.get(&id), Some(Node::Delay(_))) {
                continue;
            }
            self.sum_inputs(id, input);
            if let Some(Node::Delay(d)) = self.nodes.get_mut(&id) {
                d.line.write_block(input);
            }
        }
        Ok(())
    }
}

/// Soft clipper using tanh to prevent harsh digital clipping.
fn soft_clip(x: f32) -> f32 {
    x.tanh()
}
