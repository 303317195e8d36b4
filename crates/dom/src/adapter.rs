//! Adapters: typed views over untyped nodes
//!
//! A node type declares [`AdapterBinding`]s. Asking a node for a capability
//! `C` (a concrete adapter type or a trait object such as `dyn Named`)
//! walks the bindings most-derived first and returns the first one that
//! exposes `C`; [`Document::adapt_all`] returns every such adapter. Each
//! adapter type is constructed at most once per node and cached there; its
//! [`Adapter::on_node_set`] hook runs right after the first construction.
//!
//! Adapters hold a `NodeId`, not the node. Reads and writes go through the
//! document, so there is no ownership cycle between a node and its views.

use crate::document::Document;
use crate::error::{DomError, Result};
use crate::schema::AttributeInfo;
use crate::types::{AttributeValue, NodeId};
use ahash::AHashMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::rc::Rc;

/// Behaviour attached to nodes of a type
pub trait Adapter: Any {
    /// Called once, after the adapter is first bound to its node
    fn on_node_set(&self, _document: &mut Document) -> Result<()> {
        Ok(())
    }
}

type Factory = dyn Fn(NodeId) -> (Rc<dyn Any>, Rc<dyn Adapter>) + Send + Sync;

struct CastFn<C: ?Sized>(Box<dyn Fn(Rc<dyn Any>) -> Option<Rc<C>> + Send + Sync>);

/// How to build one adapter type and which capabilities it exposes
pub struct AdapterBinding {
    adapter_type: TypeId,
    adapter_name: &'static str,
    factory: Box<Factory>,
    casters: AHashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl AdapterBinding {
    /// Start a binding for adapter type `A`; `A` itself is always exposed
    pub fn of<A: Adapter>(
        factory: impl Fn(NodeId) -> A + Send + Sync + 'static,
    ) -> BindingBuilder<A> {
        let binding = AdapterBinding {
            adapter_type: TypeId::of::<A>(),
            adapter_name: std::any::type_name::<A>(),
            factory: Box::new(move |node| {
                let adapter = Rc::new(factory(node));
                (adapter.clone() as Rc<dyn Any>, adapter as Rc<dyn Adapter>)
            }),
            casters: AHashMap::new(),
        };
        BindingBuilder {
            binding,
            _adapter: PhantomData,
        }
        .expose::<A>(|a| a)
    }

    pub fn adapter_type(&self) -> TypeId {
        self.adapter_type
    }

    pub fn adapter_name(&self) -> &'static str {
        self.adapter_name
    }

    pub fn supports<C: ?Sized + 'static>(&self) -> bool {
        self.casters.contains_key(&TypeId::of::<C>())
    }

    pub(crate) fn construct(&self, node: NodeId) -> (Rc<dyn Any>, Rc<dyn Adapter>) {
        (self.factory)(node)
    }

    pub(crate) fn cast<C: ?Sized + 'static>(&self, instance: &Rc<dyn Any>) -> Option<Rc<C>> {
        let caster = self
            .casters
            .get(&TypeId::of::<C>())?
            .downcast_ref::<CastFn<C>>()?;
        (caster.0)(instance.clone())
    }
}

impl fmt::Debug for AdapterBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterBinding")
            .field("adapter", &self.adapter_name)
            .field("capabilities", &self.casters.len())
            .finish()
    }
}

/// Typed builder returned by [`AdapterBinding::of`]
pub struct BindingBuilder<A> {
    binding: AdapterBinding,
    _adapter: PhantomData<fn() -> A>,
}

impl<A: Adapter> BindingBuilder<A> {
    /// Expose capability `C`, usually a trait object the adapter implements:
    /// `.expose::<dyn Named>(|a| a as Rc<dyn Named>)`
    pub fn expose<C: ?Sized + 'static>(mut self, cast: fn(Rc<A>) -> Rc<C>) -> Self {
        let caster: CastFn<C> = CastFn(Box::new(move |any: Rc<dyn Any>| {
            any.downcast::<A>().ok().map(cast)
        }));
        self.binding
            .casters
            .insert(TypeId::of::<C>(), Box::new(caster));
        self
    }
}

impl<A: Adapter> From<BindingBuilder<A>> for AdapterBinding {
    fn from(builder: BindingBuilder<A>) -> Self {
        builder.binding
    }
}

/// Adapter instance cached on a node
pub(crate) struct CachedAdapter {
    pub(crate) adapter_type: TypeId,
    pub(crate) instance: Rc<dyn Any>,
    pub(crate) hook: Rc<dyn Adapter>,
}

impl fmt::Debug for CachedAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedAdapter")
            .field("adapter_type", &self.adapter_type)
            .finish()
    }
}

/// A capability of one node.
///
/// Equality and hashing go by the underlying node, so two capabilities of
/// the same node compare equal.
pub struct Adapted<C: ?Sized> {
    node: NodeId,
    inner: Rc<C>,
}

impl<C: ?Sized> Adapted<C> {
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Same adapter instance, not just the same node
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn into_inner(self) -> Rc<C> {
        self.inner
    }
}

impl<C: ?Sized> Clone for Adapted<C> {
    fn clone(&self) -> Self {
        Self {
            node: self.node,
            inner: self.inner.clone(),
        }
    }
}

impl<C: ?Sized> Deref for Adapted<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.inner
    }
}

impl<C: ?Sized, D: ?Sized> PartialEq<Adapted<D>> for Adapted<C> {
    fn eq(&self, other: &Adapted<D>) -> bool {
        self.node == other.node
    }
}

impl<C: ?Sized> Eq for Adapted<C> {}

impl<C: ?Sized> PartialEq<NodeId> for Adapted<C> {
    fn eq(&self, other: &NodeId) -> bool {
        self.node == *other
    }
}

impl<C: ?Sized> Hash for Adapted<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node.hash(state);
    }
}

impl<C: ?Sized> fmt::Debug for Adapted<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Adapted<{}>({})", std::any::type_name::<C>(), self.node)
    }
}

impl<C: ?Sized> From<&Adapted<C>> for NodeId {
    fn from(adapted: &Adapted<C>) -> Self {
        adapted.node
    }
}

impl Document {
    /// Capability `C` of `node`, or `None` if no binding of its type exposes it
    pub fn adapt<C: ?Sized + 'static>(&mut self, node: NodeId) -> Result<Option<Adapted<C>>> {
        let node_type = self.arena.get(node)?.node_type.clone();
        let Some(binding) = node_type
            .adapters()
            .iter()
            .find(|b| b.supports::<C>())
        else {
            return Ok(None);
        };

        let instance = self.instance_for(node, binding)?;
        Ok(binding
            .cast::<C>(&instance)
            .map(|inner| Adapted { node, inner }))
    }

    /// Like [`Document::adapt`], failing with `Adaptation` when unsupported
    pub fn cast<C: ?Sized + 'static>(&mut self, node: NodeId) -> Result<Adapted<C>> {
        match self.adapt::<C>(node)? {
            Some(adapted) => Ok(adapted),
            None => Err(DomError::Adaptation {
                node_type: self.arena.get(node)?.node_type.name().to_string(),
                capability: std::any::type_name::<C>(),
            }),
        }
    }

    pub fn can_adapt<C: ?Sized + 'static>(&self, node: NodeId) -> bool {
        self.arena
            .get(node)
            .map(|n| n.node_type.adapters().iter().any(|b| b.supports::<C>()))
            .unwrap_or(false)
    }

    /// Every adapter of `node` exposing capability `C`, most-derived binding
    /// first. Each adapter type appears once.
    pub fn adapt_all<C: ?Sized + 'static>(&mut self, node: NodeId) -> Result<Vec<Adapted<C>>> {
        let node_type = self.arena.get(node)?.node_type.clone();
        let mut adapted = Vec::new();
        for binding in node_type.adapters().iter().filter(|b| b.supports::<C>()) {
            let instance = self.instance_for(node, binding)?;
            if let Some(inner) = binding.cast::<C>(&instance) {
                adapted.push(Adapted { node, inner });
            }
        }
        Ok(adapted)
    }

    /// Capability `C` of every node that supports it, in input order
    pub fn adapt_each<C: ?Sized + 'static>(
        &mut self,
        nodes: impl IntoIterator<Item = NodeId>,
    ) -> Result<Vec<Adapted<C>>> {
        let mut adapted = Vec::new();
        for node in nodes {
            if let Some(a) = self.adapt::<C>(node)? {
                adapted.push(a);
            }
        }
        Ok(adapted)
    }

    /// Eagerly bind every declared adapter in the subtree of `root`
    pub fn initialize_adapters(&mut self, root: NodeId) -> Result<()> {
        let nodes: Vec<NodeId> = self.arena.subtree(root).collect();
        for node in nodes {
            let node_type = self.arena.get(node)?.node_type.clone();
            for binding in node_type.adapters() {
                let bound = self
                    .arena
                    .get(node)?
                    .adapters
                    .iter()
                    .any(|c| c.adapter_type == binding.adapter_type());
                if !bound {
                    self.bind_adapter(node, binding)?;
                }
            }
        }
        Ok(())
    }

    /// Cached instance of `binding`'s adapter on `node`, bound on first use
    fn instance_for(&mut self, node: NodeId, binding: &AdapterBinding) -> Result<Rc<dyn Any>> {
        let cached = self
            .arena
            .get(node)?
            .adapters
            .iter()
            .find(|c| c.adapter_type == binding.adapter_type())
            .map(|c| c.instance.clone());
        match cached {
            Some(instance) => Ok(instance),
            None => self.bind_adapter(node, binding),
        }
    }

    fn bind_adapter(&mut self, node: NodeId, binding: &AdapterBinding) -> Result<Rc<dyn Any>> {
        let (instance, hook) = binding.construct(node);
        self.arena.get_mut(node)?.adapters.push(CachedAdapter {
            adapter_type: binding.adapter_type(),
            instance: instance.clone(),
            hook: hook.clone(),
        });
        tracing::trace!("Bound {} to node {}", binding.adapter_name(), node);
        hook.on_node_set(self)?;
        Ok(instance)
    }
}

/// Convenience accessors for adapters that wrap a single node
pub trait DomNodeAdapter {
    fn node(&self) -> NodeId;

    fn get_attribute(&self, document: &Document, info: &AttributeInfo) -> Result<AttributeValue> {
        document.get_attribute(self.node(), info)
    }

    fn set_attribute(
        &self,
        document: &mut Document,
        info: &AttributeInfo,
        value: impl Into<AttributeValue>,
    ) -> Result<()>
    where
        Self: Sized,
    {
        document.set_attribute(self.node(), info, value)
    }

    fn parent(&self, document: &Document) -> Option<NodeId> {
        document.parent(self.node())
    }

    /// Capability `C` of the parent node
    fn parent_as<C: ?Sized + 'static>(&self, document: &mut Document) -> Result<Option<Adapted<C>>>
    where
        Self: Sized,
    {
        match document.parent(self.node()) {
            Some(parent) => document.adapt::<C>(parent),
            None => Ok(None),
        }
    }

    /// Closest proper ancestor supporting capability `C`
    fn ancestor_as<C: ?Sized + 'static>(&self, document: &mut Document) -> Result<Option<Adapted<C>>>
    where
        Self: Sized,
    {
        let ancestry: Vec<NodeId> = document.lineage(self.node()).skip(1).collect();
        for ancestor in ancestry {
            if let Some(adapted) = document.adapt::<C>(ancestor)? {
                return Ok(Some(adapted));
            }
        }
        Ok(None)
    }
}
