//! Graph registration, layer partitioning, arena sizing and the per-step
//! forward/backward driver.

use crate::error::GradFlowError;
use crate::memory::{MemoryArenas, TensorPointer};

use super::operation::{OpId, OpKind, OpNode, OpTag, Side};

/// Owns the operation graph, the three arenas and all step state. Multiple
/// contexts can coexist; nothing is shared between them.
///
/// Lifecycle: build the graph through the factory methods, register every
/// leaf root with [`register_operation`](Self::register_operation), seal it
/// with [`initialize_execution`](Self::initialize_execution), then drive
/// steps with [`execute_propagation`](Self::execute_propagation) or
/// [`run`](Self::run).
pub struct ExecutionContext {
    pub(crate) nodes: Vec<OpNode>,
    pub(crate) memory: MemoryArenas,
    /// Registered roots, in registration order; the index is the layer index.
    layers: Vec<OpId>,
    /// Last operation of each layer's downstream chain, indexed by layer.
    layer_tails: Vec<OpId>,
    /// Operations with no downstream consumer, in registration order.
    terminal_operations: Vec<OpId>,
    initialized: bool,
    epochs: usize,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::with_epochs(1)
    }

    /// A context whose [`run`](Self::run) drives `epochs` full steps.
    pub fn with_epochs(epochs: usize) -> Self {
        ExecutionContext {
            nodes: Vec::new(),
            memory: MemoryArenas::new(0, 0),
            layers: Vec::new(),
            layer_tails: Vec::new(),
            terminal_operations: Vec::new(),
            initialized: false,
            epochs,
        }
    }

    /// Registers a graph root and assigns it a fresh layer index.
    ///
    /// Every leaf (variable, constant, input source) must be registered
    /// before [`initialize_execution`](Self::initialize_execution), in
    /// forward order; the last registered root's downstream chain claims the
    /// graph sink, which makes it the first layer of the backward walk.
    pub fn register_operation(&mut self, operation: OpId) -> Result<(), GradFlowError> {
        if self.initialized {
            return Err(GradFlowError::GraphSealed);
        }
        let node = &self.nodes[operation.0];
        if !node.is_leaf() {
            return Err(GradFlowError::NotALeaf);
        }
        if let Some(layer) = node.layer {
            return Err(GradFlowError::AlreadyRegistered { layer });
        }
        let layer = self.layers.len();
        self.nodes[operation.0].layer = Some(layer);
        self.layers.push(operation);
        log::trace!("registered root {operation:?} as layer {layer}");
        Ok(())
    }

    /// Seals the graph: partitions it into layers, sizes the arenas and
    /// allocates them. One-shot; a second call fails.
    pub fn initialize_execution(&mut self) -> Result<(), GradFlowError> {
        if self.initialized {
            return Err(GradFlowError::AlreadyInitialized);
        }
        self.split_graph_by_layers();
        for node in &self.nodes {
            if node.layer.is_none() {
                return Err(GradFlowError::UnlayeredOperation);
            }
        }
        self.initialize_buffers();
        self.initialized = true;
        Ok(())
    }

    /// Walks each root's `next` chain, last root first, claiming unassigned
    /// operations for the root's layer and stopping at the first operation
    /// owned by a different layer. Records each chain's last operation as
    /// the layer tail and collects terminal operations.
    fn split_graph_by_layers(&mut self) {
        let layer_count = self.layers.len();
        let mut tails = vec![OpId(0); layer_count];
        let mut terminals = Vec::new();

        for i in (0..layer_count).rev() {
            let mut current = self.layers[i];
            while let Some(next) = self.nodes[current.0].next {
                match self.nodes[next.0].layer {
                    Some(layer) if layer != i => break,
                    _ => {
                        self.nodes[next.0].layer = Some(i);
                        current = next;
                    }
                }
            }
            tails[i] = current;
            if self.nodes[current.0].next.is_none() {
                terminals.push(current);
            }
        }

        // The walk ran from the last root to the first; report terminals in
        // registration order.
        terminals.reverse();
        self.layer_tails = tails;
        self.terminal_operations = terminals;
    }

    /// Forward capacity is the sum over layers of each layer's summed
    /// forward allocations; backward capacity is the max over layers of the
    /// summed backward allocations. The bump indices never exceeding these
    /// totals is what makes the step driver allocation-free.
    fn initialize_buffers(&mut self) {
        let mut forward_total = 0;
        let mut backward_max = 0;

        for (i, &root) in self.layers.iter().enumerate() {
            let mut forward = 0;
            let mut backward = 0;
            let mut current = root;
            loop {
                let node = &self.nodes[current.0];
                forward += node.forward_footprint();
                backward += node.backward_footprint();
                match node.next {
                    Some(next) if self.nodes[next.0].layer == Some(i) => current = next,
                    _ => break,
                }
            }
            log::debug!("layer {i}: forward footprint {forward}, backward footprint {backward}");
            forward_total += forward;
            backward_max = backward_max.max(backward);
        }

        log::debug!("arenas: forward {forward_total} floats, backward 2 x {backward_max} floats");
        self.memory = MemoryArenas::new(forward_total, backward_max);
    }

    /// Evaluates every terminal operation and returns their result handles
    /// in registration order. Resets the forward bump index first, so the
    /// handles of the previous step become invalid.
    pub fn execute_forward_propagation(&mut self) -> Result<Vec<TensorPointer>, GradFlowError> {
        if !self.initialized {
            return Err(GradFlowError::NotInitialized);
        }
        self.memory.reset_forward();
        let terminals = self.terminal_operations.clone();
        let mut results = Vec::with_capacity(terminals.len());
        for terminal in terminals {
            results.push(self.forward_operation(terminal)?);
        }
        Ok(results)
    }

    /// Walks the layers from the sink to the sources, swapping the backward
    /// arenas at every layer boundary. Optimizers fire as gradients reach
    /// their variables.
    pub fn execute_backward_propagation(&mut self) -> Result<(), GradFlowError> {
        if !self.initialized {
            return Err(GradFlowError::NotInitialized);
        }
        self.memory.reset_backward();
        for layer in (0..self.layer_tails.len()).rev() {
            let tail = self.layer_tails[layer];
            self.back_step(tail)?;
            self.memory.swap_backward();
        }
        Ok(())
    }

    /// One full training step: forward then backward.
    pub fn execute_propagation(&mut self) -> Result<Vec<TensorPointer>, GradFlowError> {
        let results = self.execute_forward_propagation()?;
        self.execute_backward_propagation()?;
        Ok(results)
    }

    /// Drives the configured number of epochs, one full step each.
    pub fn run(&mut self) -> Result<(), GradFlowError> {
        for epoch in 0..self.epochs {
            log::trace!("epoch {epoch}");
            self.execute_propagation()?;
        }
        Ok(())
    }

    /// Resolves a result handle to its float slice. The only read path for
    /// external callers.
    pub fn memory_buffer(&self, pointer: &TensorPointer) -> Result<&[f32], GradFlowError> {
        self.memory.buffer(pointer)
    }

    /// Flips every cost function between training mode (loss not
    /// materialized, forward returns the null handle) and full-pass mode.
    pub fn set_training_mode(&mut self, training: bool) {
        for node in &mut self.nodes {
            match &mut node.kind {
                OpKind::SoftmaxCrossEntropy { training: mode, .. }
                | OpKind::MeanSquaredError { training: mode, .. } => *mode = training,
                _ => {}
            }
        }
    }

    fn forward_operation(&mut self, id: OpId) -> Result<TensorPointer, GradFlowError> {
        let (left, right) = {
            let node = &self.nodes[id.0];
            (node.left, node.right)
        };
        let left_result = match left {
            Some(input) => self.forward_operation(input)?,
            None => TensorPointer::NULL,
        };
        let right_result = match right {
            Some(input) => self.forward_operation(input)?,
            None => TensorPointer::NULL,
        };
        {
            let node = &mut self.nodes[id.0];
            node.left_result = left_result;
            node.right_result = right_result;
        }

        match self.nodes[id.0].kind.tag() {
            OpTag::Variable => self.forward_variable(id),
            OpTag::Constant => self.forward_constant(id),
            OpTag::InputSource => self.forward_input_source(id),
            OpTag::Add => self.forward_add(id),
            OpTag::Multiplication => self.forward_multiplication(id),
            OpTag::HadamardProduct => self.forward_hadamard(id),
            OpTag::LeakyRelu => self.forward_leaky_relu(id),
            OpTag::SoftmaxCrossEntropy => self.forward_softmax_cross_entropy(id),
            OpTag::MeanSquaredError => self.forward_mean_squared_error(id),
            OpTag::BroadcastBias => self.forward_broadcast_bias(id),
        }
    }

    /// Computes the gradients an operation owes its inputs, delivers them,
    /// and recurses while the traversal stays inside the operation's layer.
    /// Inter-layer handoff happens through the layer loop of
    /// [`execute_backward_propagation`](Self::execute_backward_propagation),
    /// under the arena swap.
    fn back_step(&mut self, id: OpId) -> Result<(), GradFlowError> {
        let (left, right, layer) = {
            let node = &self.nodes[id.0];
            (node.left, node.right, node.layer)
        };

        if let Some(input) = left {
            if self.nodes[input.0].requires_derivative {
                let gradient = self.backward_left(id)?;
                if !gradient.is_null() {
                    self.deliver_derivative(input, gradient)?;
                    if self.nodes[input.0].layer == layer {
                        self.back_step(input)?;
                    }
                }
            }
        }

        if let Some(input) = right {
            if self.nodes[input.0].requires_derivative {
                let gradient = self.backward_right(id)?;
                if !gradient.is_null() {
                    self.deliver_derivative(input, gradient)?;
                    if self.nodes[input.0].layer == layer {
                        self.back_step(input)?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Stores the upstream gradient on the receiving node. A variable fires
    /// its optimizer immediately, while the handle still addresses the
    /// current backward arena; a later layer's swap would reclaim the slot.
    fn deliver_derivative(
        &mut self,
        id: OpId,
        gradient: TensorPointer,
    ) -> Result<(), GradFlowError> {
        self.nodes[id.0].derivative_chain = gradient.clone();
        if let OpKind::Variable {
            data,
            shape,
            optimizer,
        } = &mut self.nodes[id.0].kind
        {
            let slice = self.memory.buffer(&gradient)?;
            optimizer.optimize(data, slice, shape)?;
        }
        Ok(())
    }

    fn backward_left(&mut self, id: OpId) -> Result<TensorPointer, GradFlowError> {
        match self.nodes[id.0].kind.tag() {
            OpTag::Add => self.backward_add(id, Side::Left),
            OpTag::Multiplication => self.backward_multiplication_left(id),
            OpTag::HadamardProduct => self.backward_hadamard(id, Side::Left),
            OpTag::LeakyRelu => self.backward_leaky_relu(id),
            OpTag::SoftmaxCrossEntropy => self.backward_softmax_cross_entropy(id),
            OpTag::MeanSquaredError => self.backward_mean_squared_error(id),
            OpTag::BroadcastBias => self.backward_broadcast_bias(id),
            // Leaves have no inputs; the walk never asks them for gradients.
            OpTag::Variable | OpTag::Constant | OpTag::InputSource => Ok(TensorPointer::NULL),
        }
    }

    fn backward_right(&mut self, id: OpId) -> Result<TensorPointer, GradFlowError> {
        match self.nodes[id.0].kind.tag() {
            OpTag::Add => self.backward_add(id, Side::Right),
            OpTag::Multiplication => self.backward_multiplication_right(id),
            OpTag::HadamardProduct => self.backward_hadamard(id, Side::Right),
            // Unary operations and cost-function label sides produce no
            // right gradient.
            _ => Ok(TensorPointer::NULL),
        }
    }

    /// Appends a node, wiring it as the downstream consumer of its inputs.
    pub(crate) fn attach(
        &mut self,
        kind: OpKind,
        left: Option<OpId>,
        right: Option<OpId>,
        max_result_shape: Vec<usize>,
        requires_derivative: bool,
    ) -> Result<OpId, GradFlowError> {
        if self.initialized {
            return Err(GradFlowError::GraphSealed);
        }
        for input in [left, right].into_iter().flatten() {
            if self.nodes[input.0].next.is_some() {
                return Err(GradFlowError::OperandAlreadyConsumed);
            }
        }
        let id = OpId(self.nodes.len());
        for input in [left, right].into_iter().flatten() {
            self.nodes[input.0].next = Some(id);
        }
        self.nodes
            .push(OpNode::new(kind, left, right, max_result_shape, requires_derivative));
        Ok(id)
    }

    pub(crate) fn node(&self, id: OpId) -> &OpNode {
        &self.nodes[id.0]
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
