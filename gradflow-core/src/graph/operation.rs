//! Graph nodes: stable integer ids, per-node bookkeeping and the closed set
//! of operation kinds.
//!
//! Nodes live in a flat arena owned by the execution context. Consumers hold
//! the [`OpId`] of their inputs and write themselves into the inputs' `next`
//! slot at construction time, which gives the layering pass its downstream
//! spine without any shared mutable references.

use crate::memory::pointer::stride;
use crate::memory::TensorPointer;
use crate::ops::input_source::MiniBatchSource;
use crate::optim::GradientOptimizer;

/// Stable identifier of an operation inside one execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpId(pub(crate) usize);

#[derive(Debug)]
pub(crate) struct OpNode {
    pub kind: OpKind,
    pub left: Option<OpId>,
    pub right: Option<OpId>,
    pub next: Option<OpId>,
    /// Assigned at registration (roots) or during the layer split.
    pub layer: Option<usize>,
    /// True iff a trainable variable is reachable through the inputs.
    pub requires_derivative: bool,
    /// Upper bound on any shape this node may emit; sizes the arenas.
    pub max_result_shape: Vec<usize>,
    pub left_result: TensorPointer,
    pub right_result: TensorPointer,
    /// Upstream gradient delivered by the downstream consumer.
    pub derivative_chain: TensorPointer,
}

impl OpNode {
    pub(crate) fn new(
        kind: OpKind,
        left: Option<OpId>,
        right: Option<OpId>,
        max_result_shape: Vec<usize>,
        requires_derivative: bool,
    ) -> Self {
        OpNode {
            kind,
            left,
            right,
            next: None,
            layer: None,
            requires_derivative,
            max_result_shape,
            left_result: TensorPointer::NULL,
            right_result: TensorPointer::NULL,
            derivative_chain: TensorPointer::NULL,
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    /// Shapes this node bump-allocates from the forward arena in one step.
    pub(crate) fn forward_allocations(&self) -> Vec<Vec<usize>> {
        match &self.kind {
            OpKind::Variable { .. }
            | OpKind::Constant { .. }
            | OpKind::InputSource { .. }
            | OpKind::Add { .. }
            | OpKind::Multiplication { .. }
            | OpKind::HadamardProduct
            | OpKind::LeakyRelu { .. }
            | OpKind::BroadcastBias { .. } => vec![self.max_result_shape.clone()],
            // Cost functions cache an intermediate and may materialize the
            // scalar loss.
            OpKind::SoftmaxCrossEntropy { .. } | OpKind::MeanSquaredError { .. } => {
                vec![self.max_result_shape.clone(), vec![1, 1]]
            }
        }
    }

    /// Shapes this node bump-allocates from the backward arena while its
    /// layer is being walked.
    pub(crate) fn backward_allocations(&self) -> Vec<Vec<usize>> {
        match &self.kind {
            OpKind::Variable { .. } | OpKind::Constant { .. } | OpKind::InputSource { .. } => {
                Vec::new()
            }
            OpKind::Add { broadcast_rows } => {
                let mut allocations = vec![self.max_result_shape.clone()];
                if *broadcast_rows {
                    allocations.push(vec![1, self.max_result_shape[1]]);
                } else {
                    allocations.push(self.max_result_shape.clone());
                }
                allocations
            }
            OpKind::Multiplication { m, k, n } => vec![vec![*m, *k], vec![*k, *n]],
            OpKind::HadamardProduct => {
                vec![self.max_result_shape.clone(), self.max_result_shape.clone()]
            }
            OpKind::LeakyRelu { .. } => vec![self.max_result_shape.clone()],
            OpKind::SoftmaxCrossEntropy { .. } | OpKind::MeanSquaredError { .. } => {
                vec![self.max_result_shape.clone()]
            }
            OpKind::BroadcastBias { .. } => vec![vec![self.max_result_shape[0], 1]],
        }
    }

    pub(crate) fn forward_footprint(&self) -> usize {
        self.forward_allocations()
            .iter()
            .map(|shape| stride(shape))
            .sum()
    }

    pub(crate) fn backward_footprint(&self) -> usize {
        self.backward_allocations()
            .iter()
            .map(|shape| stride(shape))
            .sum()
    }
}

/// Closed set of operation kinds, dispatched by `match` in the step driver.
#[derive(Debug)]
pub(crate) enum OpKind {
    /// Trainable leaf with persistent storage and a bound optimizer.
    Variable {
        data: Vec<f32>,
        shape: Vec<usize>,
        optimizer: Box<dyn GradientOptimizer>,
    },
    /// Non-trainable leaf with persistent storage.
    Constant { data: Vec<f32>, shape: Vec<usize> },
    /// Leaf fed from a mini-batch source between steps.
    InputSource { source: MiniBatchSource },
    Add { broadcast_rows: bool },
    Multiplication { m: usize, k: usize, n: usize },
    HadamardProduct,
    LeakyRelu { slope: f32 },
    SoftmaxCrossEntropy {
        softmax: TensorPointer,
        training: bool,
    },
    MeanSquaredError {
        diff: TensorPointer,
        training: bool,
    },
    BroadcastBias { columns: usize },
}

/// Which input of a binary operation a gradient is being computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
}

/// Copyable discriminant used to route dispatch without borrowing the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpTag {
    Variable,
    Constant,
    InputSource,
    Add,
    Multiplication,
    HadamardProduct,
    LeakyRelu,
    SoftmaxCrossEntropy,
    MeanSquaredError,
    BroadcastBias,
}

impl OpKind {
    pub(crate) fn tag(&self) -> OpTag {
        match self {
            OpKind::Variable { .. } => OpTag::Variable,
            OpKind::Constant { .. } => OpTag::Constant,
            OpKind::InputSource { .. } => OpTag::InputSource,
            OpKind::Add { .. } => OpTag::Add,
            OpKind::Multiplication { .. } => OpTag::Multiplication,
            OpKind::HadamardProduct => OpTag::HadamardProduct,
            OpKind::LeakyRelu { .. } => OpTag::LeakyRelu,
            OpKind::SoftmaxCrossEntropy { .. } => OpTag::SoftmaxCrossEntropy,
            OpKind::MeanSquaredError { .. } => OpTag::MeanSquaredError,
            OpKind::BroadcastBias { .. } => OpTag::BroadcastBias,
        }
    }
}
