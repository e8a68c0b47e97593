//! Reference CPU kernels
//!
//! Just enough operator coverage to run small models end to end:
//! - Gemm: Y = alpha * A' * B' + beta * C (A', B' optionally transposed)
//! - MatMul: 2-D matrix product
//! - Add, Mul: elementwise with NumPy broadcasting
//! - Relu, Identity, Cast, Constant

use crate::ir::tensor::element_count;
use crate::ir::{AttributePayload, ElementType, OperatorNode, TensorData, TensorValues, ONNX_DOMAIN};
use crate::{GraphError, Result};

/// Run one node on already-computed inputs
///
/// `inputs` is aligned with the node's input names; omitted optional inputs
/// are `None`.
pub(crate) fn execute(node: &OperatorNode, inputs: &[Option<&TensorData>]) -> Result<Vec<TensorData>> {
    if node.domain() != ONNX_DOMAIN {
        return Err(GraphError::Unsupported(format!(
            "reference session has no kernels for domain '{}' (node '{}')",
            node.domain(),
            node.name()
        )));
    }

    let output = match node.op_type() {
        "Gemm" => gemm(node, inputs)?,
        "MatMul" => matmul(node, inputs)?,
        "Add" => binary(node, inputs, |a, b| a + b, |a, b| a + b)?,
        "Mul" => binary(node, inputs, |a, b| a * b, |a, b| a * b)?,
        "Relu" => relu(node, inputs)?,
        "Identity" => required(node, inputs, 0)?.clone(),
        "Cast" => cast(node, inputs)?,
        "Constant" => constant(node)?,
        other => {
            return Err(GraphError::Unsupported(format!(
                "reference session has no kernel for {} (node '{}')",
                other,
                node.name()
            )))
        }
    };
    Ok(vec![output])
}

fn required<'a>(node: &OperatorNode, inputs: &[Option<&'a TensorData>], index: usize) -> Result<&'a TensorData> {
    inputs.get(index).copied().flatten().ok_or_else(|| {
        GraphError::Execution(format!(
            "{} node '{}' is missing input {}",
            node.op_type(),
            node.name(),
            index
        ))
    })
}

fn float_input<'a>(node: &OperatorNode, inputs: &[Option<&'a TensorData>], index: usize) -> Result<&'a [f32]> {
    let tensor = required(node, inputs, index)?;
    tensor.as_f32().ok_or_else(|| {
        GraphError::Execution(format!(
            "{} node '{}' expects float input {}, got {}",
            node.op_type(),
            node.name(),
            index,
            tensor.element_type()
        ))
    })
}

fn matrix_dims(node: &OperatorNode, tensor: &TensorData) -> Result<(usize, usize)> {
    match tensor.dims() {
        [rows, cols] => Ok((*rows as usize, *cols as usize)),
        dims => Err(GraphError::Execution(format!(
            "{} node '{}' expects 2-D operands, got shape {:?}",
            node.op_type(),
            node.name(),
            dims
        ))),
    }
}

fn int_attr(node: &OperatorNode, name: &str, default: i64) -> i64 {
    node.attribute(name).and_then(|a| a.as_int()).unwrap_or(default)
}

fn float_attr(node: &OperatorNode, name: &str, default: f32) -> f32 {
    node.attribute(name).and_then(|a| a.as_float()).unwrap_or(default)
}

fn gemm(node: &OperatorNode, inputs: &[Option<&TensorData>]) -> Result<TensorData> {
    let alpha = float_attr(node, "alpha", 1.0);
    let beta = float_attr(node, "beta", 1.0);
    let trans_a = int_attr(node, "transA", 0) != 0;
    let trans_b = int_attr(node, "transB", 0) != 0;

    let a_tensor = required(node, inputs, 0)?;
    let b_tensor = required(node, inputs, 1)?;
    let a = float_input(node, inputs, 0)?;
    let b = float_input(node, inputs, 1)?;

    let (a_rows, a_cols) = matrix_dims(node, a_tensor)?;
    let (b_rows, b_cols) = matrix_dims(node, b_tensor)?;
    let (m, k) = if trans_a { (a_cols, a_rows) } else { (a_rows, a_cols) };
    let (kb, n) = if trans_b { (b_cols, b_rows) } else { (b_rows, b_cols) };
    if k != kb {
        return Err(GraphError::Execution(format!(
            "Gemm node '{}': inner dimensions differ ({} vs {})",
            node.name(),
            k,
            kb
        )));
    }

    let a_at = |i: usize, p: usize| if trans_a { a[p * a_cols + i] } else { a[i * a_cols + p] };
    let b_at = |p: usize, j: usize| if trans_b { b[j * b_cols + p] } else { b[p * b_cols + j] };

    let mut out = vec![0.0f32; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0f32;
            for p in 0..k {
                sum += a_at(i, p) * b_at(p, j);
            }
            out[i * n + j] = alpha * sum;
        }
    }

    if let Some(c_tensor) = inputs.get(2).copied().flatten() {
        let c = float_input(node, inputs, 2)?;
        let (_, bias) = broadcast_to(c, c_tensor.dims(), &[m as i64, n as i64])?;
        for (value, bias) in out.iter_mut().zip(bias) {
            *value += beta * bias;
        }
    }

    TensorData::from_f32(vec![m as i64, n as i64], out)
}

fn matmul(node: &OperatorNode, inputs: &[Option<&TensorData>]) -> Result<TensorData> {
    let a_tensor = required(node, inputs, 0)?;
    let b_tensor = required(node, inputs, 1)?;
    let a = float_input(node, inputs, 0)?;
    let b = float_input(node, inputs, 1)?;
    let (m, k) = matrix_dims(node, a_tensor)?;
    let (kb, n) = matrix_dims(node, b_tensor)?;
    if k != kb {
        return Err(GraphError::Execution(format!(
            "MatMul node '{}': inner dimensions differ ({} vs {})",
            node.name(),
            k,
            kb
        )));
    }

    let mut out = vec![0.0f32; m * n];
    for i in 0..m {
        for p in 0..k {
            let lhs = a[i * k + p];
            for j in 0..n {
                out[i * n + j] += lhs * b[p * n + j];
            }
        }
    }
    TensorData::from_f32(vec![m as i64, n as i64], out)
}

fn binary(
    node: &OperatorNode,
    inputs: &[Option<&TensorData>],
    float_op: fn(f32, f32) -> f32,
    int_op: fn(i64, i64) -> i64,
) -> Result<TensorData> {
    let lhs = required(node, inputs, 0)?;
    let rhs = required(node, inputs, 1)?;

    match (lhs.values(), rhs.values()) {
        (TensorValues::Float(a), TensorValues::Float(b)) => {
            let (dims, out) = broadcast(a, lhs.dims(), b, rhs.dims(), float_op)?;
            TensorData::from_f32(dims, out)
        }
        (TensorValues::Int64(a), TensorValues::Int64(b)) => {
            let (dims, out) = broadcast(a, lhs.dims(), b, rhs.dims(), int_op)?;
            TensorData::from_i64(dims, out)
        }
        _ => Err(GraphError::Execution(format!(
            "{} node '{}' cannot combine {} and {}",
            node.op_type(),
            node.name(),
            lhs.element_type(),
            rhs.element_type()
        ))),
    }
}

/// NumPy-style broadcast shape of two operands
fn broadcast_shape(a: &[i64], b: &[i64]) -> Result<Vec<i64>> {
    let rank = a.len().max(b.len());
    let mut dims = vec![0; rank];
    for i in 0..rank {
        let da = if i + a.len() >= rank { a[i + a.len() - rank] } else { 1 };
        let db = if i + b.len() >= rank { b[i + b.len() - rank] } else { 1 };
        dims[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => {
                return Err(GraphError::Execution(format!(
                    "shapes {:?} and {:?} cannot be broadcast",
                    a, b
                )))
            }
        };
    }
    Ok(dims)
}

/// Row-major strides of `dims` aligned to `rank`, zero on broadcast axes
fn broadcast_strides(dims: &[i64], rank: usize) -> Vec<usize> {
    let mut strides = vec![0; rank];
    let offset = rank - dims.len();
    let mut stride = 1usize;
    for i in (0..dims.len()).rev() {
        strides[offset + i] = if dims[i] == 1 { 0 } else { stride };
        stride = stride.saturating_mul(dims[i] as usize);
    }
    strides
}

fn broadcast<T: Copy>(
    a: &[T],
    a_dims: &[i64],
    b: &[T],
    b_dims: &[i64],
    op: impl Fn(T, T) -> T,
) -> Result<(Vec<i64>, Vec<T>)> {
    let dims = broadcast_shape(a_dims, b_dims)?;
    let rank = dims.len();
    let a_strides = broadcast_strides(a_dims, rank);
    let b_strides = broadcast_strides(b_dims, rank);
    let total = element_count(&dims)?;

    let mut out = Vec::with_capacity(total);
    let mut index = vec![0usize; rank];
    for _ in 0..total {
        let ai: usize = index.iter().zip(&a_strides).map(|(i, s)| i * s).sum();
        let bi: usize = index.iter().zip(&b_strides).map(|(i, s)| i * s).sum();
        out.push(op(a[ai], b[bi]));

        for axis in (0..rank).rev() {
            index[axis] += 1;
            if index[axis] < dims[axis] as usize {
                break;
            }
            index[axis] = 0;
        }
    }
    Ok((dims, out))
}

/// Expand `values` to `target` dims
fn broadcast_to(values: &[f32], dims: &[i64], target: &[i64]) -> Result<(Vec<i64>, Vec<f32>)> {
    let shape = broadcast_shape(dims, target)?;
    if shape != target {
        return Err(GraphError::Execution(format!(
            "shape {:?} cannot be broadcast to {:?}",
            dims, target
        )));
    }
    let rank = target.len();
    let strides = broadcast_strides(dims, rank);
    let total = element_count(target)?;

    let mut out = Vec::with_capacity(total);
    let mut index = vec![0usize; rank];
    for _ in 0..total {
        let i: usize = index.iter().zip(&strides).map(|(i, s)| i * s).sum();
        out.push(values[i]);
        for axis in (0..rank).rev() {
            index[axis] += 1;
            if index[axis] < target[axis] as usize {
                break;
            }
            index[axis] = 0;
        }
    }
    Ok((shape, out))
}

fn relu(node: &OperatorNode, inputs: &[Option<&TensorData>]) -> Result<TensorData> {
    let x = required(node, inputs, 0)?;
    let dims = x.dims().to_vec();
    match x.values() {
        TensorValues::Float(v) => TensorData::from_f32(dims, v.iter().map(|&x| x.max(0.0)).collect()),
        TensorValues::Int64(v) => TensorData::from_i64(dims, v.iter().map(|&x| x.max(0)).collect()),
        _ => Err(GraphError::Execution(format!(
            "Relu node '{}' does not support {}",
            node.name(),
            x.element_type()
        ))),
    }
}

fn cast(node: &OperatorNode, inputs: &[Option<&TensorData>]) -> Result<TensorData> {
    let x = required(node, inputs, 0)?;
    let to = node
        .attribute("to")
        .and_then(|a| a.as_int())
        .and_then(ElementType::from_code)
        .ok_or_else(|| GraphError::Execution(format!("Cast node '{}' needs a valid 'to' attribute", node.name())))?;

    let as_f64: Vec<f64> = match x.values() {
        TensorValues::Float(v) => v.iter().map(|&x| x as f64).collect(),
        TensorValues::Double(v) => v.clone(),
        TensorValues::Int32(v) => v.iter().map(|&x| x as f64).collect(),
        TensorValues::Int64(v) => v.iter().map(|&x| x as f64).collect(),
        TensorValues::Bool(v) => v.iter().map(|&x| if x { 1.0 } else { 0.0 }).collect(),
        TensorValues::String(_) => {
            return Err(GraphError::Unsupported(format!(
                "Cast node '{}': string tensors cannot be cast",
                node.name()
            )))
        }
    };

    let values = match to {
        ElementType::Float => TensorValues::Float(as_f64.iter().map(|&x| x as f32).collect()),
        ElementType::Double => TensorValues::Double(as_f64),
        ElementType::Int32 => TensorValues::Int32(as_f64.iter().map(|&x| x as i32).collect()),
        ElementType::Int64 => TensorValues::Int64(as_f64.iter().map(|&x| x as i64).collect()),
        ElementType::Bool => TensorValues::Bool(as_f64.iter().map(|&x| x != 0.0).collect()),
        other => {
            return Err(GraphError::Unsupported(format!(
                "Cast node '{}': target type {} is not supported",
                node.name(),
                other
            )))
        }
    };
    TensorData::new(x.dims().to_vec(), values)
}

fn constant(node: &OperatorNode) -> Result<TensorData> {
    let attr = node.attributes().first().ok_or_else(|| {
        GraphError::Execution(format!("Constant node '{}' has no value attribute", node.name()))
    })?;

    match (attr.name(), attr.payload()) {
        ("value", AttributePayload::Tensor(t)) => Ok(t.clone()),
        ("value_float", AttributePayload::Float(v)) => Ok(TensorData::scalar_f32(*v)),
        ("value_floats", AttributePayload::Floats(v)) => TensorData::from_f32(vec![v.len() as i64], v.clone()),
        ("value_int", AttributePayload::Int(v)) => TensorData::from_i64(Vec::new(), vec![*v]),
        ("value_ints", AttributePayload::Ints(v)) => TensorData::from_i64(vec![v.len() as i64], v.clone()),
        (name, payload) => Err(GraphError::Unsupported(format!(
            "Constant node '{}': attribute '{}' of kind {} is not supported",
            node.name(),
            name,
            payload.kind_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::AttributeValue;

    fn node(op: &str, inputs: &[&str], attributes: Vec<AttributeValue>) -> OperatorNode {
        OperatorNode::new(op, "", "n", inputs.iter().copied(), ["y"], attributes).unwrap()
    }

    fn run(node: &OperatorNode, inputs: &[&TensorData]) -> TensorData {
        let inputs: Vec<Option<&TensorData>> = inputs.iter().copied().map(Some).collect();
        execute(node, &inputs).unwrap().remove(0)
    }

    #[test]
    fn test_gemm_alpha() {
        let x = TensorData::from_f32(vec![3, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let y = TensorData::from_f32(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let gemm = node("Gemm", &["x", "y"], vec![AttributeValue::float("alpha", 2.0).unwrap()]);

        let z = run(&gemm, &[&x, &y]);
        assert_eq!(z.dims(), &[3, 3]);
        assert_eq!(
            z.as_f32().unwrap(),
            &[18.0, 24.0, 30.0, 38.0, 52.0, 66.0, 58.0, 80.0, 102.0]
        );
    }

    #[test]
    fn test_gemm_transpose_and_bias() {
        // A^T where A = [[1, 3], [2, 4]] stored transposed
        let a = TensorData::from_f32(vec![2, 2], vec![1.0, 3.0, 2.0, 4.0]).unwrap();
        let b = TensorData::from_f32(vec![2, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let c = TensorData::from_f32(vec![2], vec![10.0, 20.0]).unwrap();
        let gemm = node(
            "Gemm",
            &["a", "b", "c"],
            vec![
                AttributeValue::int("transA", 1).unwrap(),
                AttributeValue::float("beta", 0.5).unwrap(),
            ],
        );

        let z = run(&gemm, &[&a, &b, &c]);
        assert_eq!(z.as_f32().unwrap(), &[6.0, 12.0, 8.0, 14.0]);
    }

    #[test]
    fn test_matmul_inner_mismatch() {
        let a = TensorData::from_f32(vec![2, 3], vec![0.0; 6]).unwrap();
        let b = TensorData::from_f32(vec![2, 2], vec![0.0; 4]).unwrap();
        let matmul = node("MatMul", &["a", "b"], vec![]);
        let err = execute(&matmul, &[Some(&a), Some(&b)]).unwrap_err();
        assert!(matches!(err, GraphError::Execution(_)));
    }

    #[test]
    fn test_add_broadcasts_row() {
        let a = TensorData::from_f32(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = TensorData::from_f32(vec![2], vec![10.0, 20.0]).unwrap();
        let sum = run(&node("Add", &["a", "b"], vec![]), &[&a, &b]);
        assert_eq!(sum.dims(), &[2, 2]);
        assert_eq!(sum.as_f32().unwrap(), &[11.0, 22.0, 13.0, 24.0]);
    }

    #[test]
    fn test_broadcast_with_zero_extent() {
        let a = TensorData::from_f32(vec![0, 1 << 40, 1], vec![]).unwrap();
        let b = TensorData::from_f32(vec![1 << 40, 1 << 40, 0], vec![]).unwrap();
        let c = TensorData::from_f32(vec![1 << 40, 1, 0], vec![]).unwrap();
        let sum = run(&node("Add", &["b", "c"], vec![]), &[&b, &c]);
        assert_eq!(sum.dims(), &[1 << 40, 1 << 40, 0]);
        assert!(sum.is_empty());

        let sum = run(&node("Add", &["a", "a"], vec![]), &[&a, &a]);
        assert!(sum.is_empty());
    }

    #[test]
    fn test_cast_int64_to_float() {
        let x = TensorData::from_i64(vec![2], vec![3, -1]).unwrap();
        let cast = node("Cast", &["x"], vec![AttributeValue::int("to", ElementType::Float.code()).unwrap()]);
        assert_eq!(run(&cast, &[&x]).as_f32().unwrap(), &[3.0, -1.0]);
    }

    #[test]
    fn test_constant_and_relu() {
        let value = TensorData::from_f32(vec![3], vec![-1.0, 0.0, 2.0]).unwrap();
        let constant_node = node("Constant", &[], vec![AttributeValue::tensor("value", value).unwrap()]);
        let c = run(&constant_node, &[]);
        let r = run(&node("Relu", &["c"], vec![]), &[&c]);
        assert_eq!(r.as_f32().unwrap(), &[0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_unknown_op_unsupported() {
        let x = TensorData::scalar_f32(1.0);
        let err = execute(&node("Softmax", &["x"], vec![]), &[Some(&x)]).unwrap_err();
        assert!(matches!(err, GraphError::Unsupported(_)));
    }
}
