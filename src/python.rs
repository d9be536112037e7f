//! The evaluator's embedded Python runtime, in the teacher's bound-API pyo3
//! style: `PyDict::new_bound`, `py.eval_bound`/`py.run_bound`, `.to_object(py)`.

use crate::ast::Node;
use crate::error::Error;
use crate::Location;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pyo3::create_exception!(tangle, ArityError, pyo3::exceptions::PyException);

/// The single mutable mapping shared by every code node, block condition, for
/// iterable and macro for the lifetime of one `process` call, plus the
/// stacked output buffers that `write()`, `Capture` and `Def` all share.
///
/// Cheap to clone: both fields are reference-counted handles to the same
/// underlying dict and buffer stack, which is exactly what a `def` macro
/// needs when it closes over the namespace it was defined in.
#[derive(Clone)]
pub(crate) struct Namespace {
    globals: Py<PyDict>,
    output: Rc<RefCell<Vec<String>>>,
}

impl Namespace {
    pub(crate) fn new(py: Python<'_>) -> PyResult<Self> {
        Ok(Namespace {
            globals: PyDict::new_bound(py).unbind(),
            output: Rc::new(RefCell::new(vec![String::new()])),
        })
    }

    pub(crate) fn install_builtins(&self, py: Python<'_>) -> PyResult<()> {
        let write = Py::new(
            py,
            WriteFn {
                output: self.output.clone(),
            },
        )?;
        self.globals.bind(py).set_item("write", write)?;
        let exists = Py::new(
            py,
            ExistsFn {
                globals: self.globals.clone(),
            },
        )?;
        self.globals.bind(py).set_item("exists", exists)?;
        Ok(())
    }

    pub(crate) fn seed(&self, py: Python<'_>, seed: &HashMap<String, PyObject>) -> PyResult<()> {
        for (k, v) in seed {
            self.globals.bind(py).set_item(k, v)?;
        }
        Ok(())
    }

    pub(crate) fn push_buffer(&self) {
        self.output.borrow_mut().push(String::new());
    }

    pub(crate) fn pop_buffer(&self) -> String {
        self.output.borrow_mut().pop().unwrap_or_default()
    }

    /// Pop the single buffer `process` pushed at the start of the call.
    pub(crate) fn take_root_buffer(&self) -> String {
        self.pop_buffer()
    }

    pub(crate) fn write_str(&self, s: &str) {
        if let Some(buf) = self.output.borrow_mut().last_mut() {
            buf.push_str(s);
        }
    }

    pub(crate) fn set(&self, py: Python<'_>, name: &str, value: PyObject) -> PyResult<()> {
        self.globals.bind(py).set_item(name, value)
    }

    pub(crate) fn get(&self, py: Python<'_>, name: &str) -> Option<PyObject> {
        self.globals
            .bind(py)
            .get_item(name)
            .ok()
            .flatten()
            .map(|v| v.to_object(py))
    }

    pub(crate) fn del(&self, py: Python<'_>, name: &str) -> PyResult<()> {
        let bound = self.globals.bind(py);
        if bound.contains(name)? {
            bound.del_item(name)
        } else {
            Ok(())
        }
    }

    pub(crate) fn eval(&self, py: Python<'_>, source: &str) -> PyResult<PyObject> {
        let globals = self.globals.bind(py);
        Ok(py.eval_bound(source, Some(globals), None)?.to_object(py))
    }

    pub(crate) fn exec(&self, py: Python<'_>, source: &str) -> PyResult<()> {
        let globals = self.globals.bind(py);
        py.run_bound(source, Some(globals), None)?;
        Ok(())
    }

    pub(crate) fn truthy(&self, py: Python<'_>, value: &PyObject) -> PyResult<bool> {
        value.bind(py).is_truthy()
    }

    pub(crate) fn stringify(&self, py: Python<'_>, value: &PyObject) -> PyResult<String> {
        Ok(value.bind(py).str()?.to_string())
    }

    pub(crate) fn is_none(&self, py: Python<'_>, value: &PyObject) -> bool {
        value.bind(py).is_none()
    }

    pub(crate) fn snapshot(&self, py: Python<'_>, names: &[String]) -> Vec<Option<PyObject>> {
        names.iter().map(|n| self.get(py, n)).collect()
    }

    pub(crate) fn restore(
        &self,
        py: Python<'_>,
        names: &[String],
        snapshot: Vec<Option<PyObject>>,
    ) -> PyResult<()> {
        for (name, value) in names.iter().zip(snapshot) {
            match value {
                Some(v) => self.set(py, name, v)?,
                None => self.del(py, name)?,
            }
        }
        Ok(())
    }

    /// Evaluate `genexpr` and call `visit` once per yielded value, in order.
    /// Lazy: values are pulled from the Python generator one at a time rather
    /// than collected up front, so an infinite generator paired with a `break`
    /// inside its own side effects still works as a Python user would expect.
    pub(crate) fn for_iterate(
        &self,
        py: Python<'_>,
        genexpr: &str,
        loc: Location,
        mut visit: impl FnMut(PyObject) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let value = self
            .eval(py, genexpr)
            .map_err(|e| Error::from_py_err(py, e, loc))?;
        let bound = value.bind(py);
        let iterator = bound.iter().map_err(|e| Error::from_py_err(py, e, loc))?;
        for item in iterator {
            let item = item.map_err(|e| Error::from_py_err(py, e, loc))?;
            visit(item.to_object(py))?;
        }
        Ok(())
    }
}

/// The `write(*objs, sep=' ', end='\n')` namespace helper. Appends to
/// whichever output buffer is currently on top of the stack.
#[pyclass(unsendable)]
struct WriteFn {
    output: Rc<RefCell<Vec<String>>>,
}

#[pymethods]
impl WriteFn {
    #[pyo3(signature = (*args, sep=None, end=None))]
    fn __call__(
        &self,
        py: Python<'_>,
        args: Vec<PyObject>,
        sep: Option<String>,
        end: Option<String>,
    ) -> PyResult<()> {
        let sep = sep.unwrap_or_else(|| " ".to_string());
        let end = end.unwrap_or_else(|| "\n".to_string());
        let mut parts = Vec::with_capacity(args.len());
        for a in &args {
            parts.push(a.bind(py).str()?.to_string());
        }
        let mut text = parts.join(&sep);
        text.push_str(&end);
        if let Some(buf) = self.output.borrow_mut().last_mut() {
            buf.push_str(&text);
        }
        Ok(())
    }
}

/// The `exists(name)` namespace helper.
#[pyclass(unsendable)]
struct ExistsFn {
    globals: Py<PyDict>,
}

#[pymethods]
impl ExistsFn {
    fn __call__(&self, py: Python<'_>, name: String) -> PyResult<bool> {
        self.globals.bind(py).contains(name)
    }
}

/// A `def`-block macro, installed into the namespace under its name. Calling
/// it from embedded Python re-enters the tree walker over its captured body.
#[pyclass(unsendable)]
pub(crate) struct Macro {
    pub(crate) name: String,
    pub(crate) params: Vec<String>,
    pub(crate) body: Vec<Node>,
    pub(crate) ns: Namespace,
}

#[pymethods]
impl Macro {
    #[pyo3(signature = (*args))]
    fn __call__(&self, py: Python<'_>, args: Vec<PyObject>) -> PyResult<String> {
        if args.len() != self.params.len() {
            return Err(ArityError::new_err((
                self.name.clone(),
                self.params.len(),
                args.len(),
            )));
        }
        let snapshot = self.ns.snapshot(py, &self.params);
        for (name, value) in self.params.iter().zip(args) {
            self.ns.set(py, name, value)?;
        }
        self.ns.push_buffer();
        let result = crate::eval::walk_nodes(py, &self.ns, &self.body);
        let captured = self.ns.pop_buffer();
        self.ns.restore(py, &self.params, snapshot)?;
        result.map_err(|e| pyo3::exceptions::PyRuntimeError::new_err(e.to_string()))?;
        Ok(captured)
    }
}
