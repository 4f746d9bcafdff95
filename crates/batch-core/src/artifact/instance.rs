//! Instancias materializadas por la factory.
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::capability::{
    Batchlet, CheckpointAlgorithm, Decider, ItemProcessor, ItemReader, ItemWriter, Listener, PartitionAnalyzer,
    PartitionCollector, PartitionMapper, PartitionReducer,
};

pub type SharedReader = Arc<Mutex<dyn ItemReader>>;
pub type SharedProcessor = Arc<Mutex<dyn ItemProcessor>>;
pub type SharedWriter = Arc<Mutex<dyn ItemWriter>>;
pub type SharedCheckpointAlgorithm = Arc<Mutex<dyn CheckpointAlgorithm>>;
pub type SharedBatchlet = Arc<dyn Batchlet>;
pub type SharedListener = Arc<dyn Listener>;
pub type SharedMapper = Arc<dyn PartitionMapper>;
pub type SharedReducer = Arc<dyn PartitionReducer>;
pub type SharedCollector = Arc<dyn PartitionCollector>;
pub type SharedAnalyzer = Arc<dyn PartitionAnalyzer>;
pub type SharedDecider = Arc<dyn Decider>;

/// Rol que el motor pide a un artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Reader,
    Processor,
    Writer,
    CheckpointAlgorithm,
    Batchlet,
    Listener,
    PartitionMapper,
    PartitionReducer,
    PartitionCollector,
    PartitionAnalyzer,
    Decider,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reader => "ItemReader",
            Self::Processor => "ItemProcessor",
            Self::Writer => "ItemWriter",
            Self::CheckpointAlgorithm => "CheckpointAlgorithm",
            Self::Batchlet => "Batchlet",
            Self::Listener => "Listener",
            Self::PartitionMapper => "PartitionMapper",
            Self::PartitionReducer => "PartitionReducer",
            Self::PartitionCollector => "PartitionCollector",
            Self::PartitionAnalyzer => "PartitionAnalyzer",
            Self::Decider => "Decider",
        };
        f.write_str(name)
    }
}

/// Objeto creado por la factory, etiquetado con la capacidad que ofrece.
#[derive(Clone)]
pub enum ArtifactInstance {
    Reader(SharedReader),
    Processor(SharedProcessor),
    Writer(SharedWriter),
    CheckpointAlgorithm(SharedCheckpointAlgorithm),
    Batchlet(SharedBatchlet),
    Listener(SharedListener),
    PartitionMapper(SharedMapper),
    PartitionReducer(SharedReducer),
    PartitionCollector(SharedCollector),
    PartitionAnalyzer(SharedAnalyzer),
    Decider(SharedDecider),
}

impl fmt::Debug for ArtifactInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArtifactInstance({})", self.capability())
    }
}

impl ArtifactInstance {
    pub fn reader(reader: impl ItemReader + 'static) -> Self {
        Self::Reader(Arc::new(Mutex::new(reader)))
    }

    pub fn processor(processor: impl ItemProcessor + 'static) -> Self {
        Self::Processor(Arc::new(Mutex::new(processor)))
    }

    pub fn writer(writer: impl ItemWriter + 'static) -> Self {
        Self::Writer(Arc::new(Mutex::new(writer)))
    }

    pub fn checkpoint_algorithm(algorithm: impl CheckpointAlgorithm + 'static) -> Self {
        Self::CheckpointAlgorithm(Arc::new(Mutex::new(algorithm)))
    }

    pub fn batchlet(batchlet: impl Batchlet + 'static) -> Self {
        Self::Batchlet(Arc::new(batchlet))
    }

    pub fn listener(listener: impl Listener + 'static) -> Self {
        Self::Listener(Arc::new(listener))
    }

    pub fn mapper(mapper: impl PartitionMapper + 'static) -> Self {
        Self::PartitionMapper(Arc::new(mapper))
    }

    pub fn reducer(reducer: impl PartitionReducer + 'static) -> Self {
        Self::PartitionReducer(Arc::new(reducer))
    }

    pub fn collector(collector: impl PartitionCollector + 'static) -> Self {
        Self::PartitionCollector(Arc::new(collector))
    }

    pub fn analyzer(analyzer: impl PartitionAnalyzer + 'static) -> Self {
        Self::PartitionAnalyzer(Arc::new(analyzer))
    }

    pub fn decider(decider: impl Decider + 'static) -> Self {
        Self::Decider(Arc::new(decider))
    }

    pub fn capability(&self) -> Capability {
        match self {
            Self::Reader(_) => Capability::Reader,
            Self::Processor(_) => Capability::Processor,
            Self::Writer(_) => Capability::Writer,
            Self::CheckpointAlgorithm(_) => Capability::CheckpointAlgorithm,
            Self::Batchlet(_) => Capability::Batchlet,
            Self::Listener(_) => Capability::Listener,
            Self::PartitionMapper(_) => Capability::PartitionMapper,
            Self::PartitionReducer(_) => Capability::PartitionReducer,
            Self::PartitionCollector(_) => Capability::PartitionCollector,
            Self::PartitionAnalyzer(_) => Capability::PartitionAnalyzer,
            Self::Decider(_) => Capability::Decider,
        }
    }
}

/// Handle tipado que se puede extraer de un `ArtifactInstance`.
pub trait Capable: Sized {
    const CAPABILITY: Capability;
    fn from_instance(instance: &ArtifactInstance) -> Option<Self>;
}

macro_rules! capable {
    ($ty:ty, $variant:ident) => {
        impl Capable for $ty {
            const CAPABILITY: Capability = Capability::$variant;

            fn from_instance(instance: &ArtifactInstance) -> Option<Self> {
                match instance {
                    ArtifactInstance::$variant(inner) => Some(inner.clone()),
                    _ => None,
                }
            }
        }
    };
}

capable!(SharedReader, Reader);
capable!(SharedProcessor, Processor);
capable!(SharedWriter, Writer);
capable!(SharedCheckpointAlgorithm, CheckpointAlgorithm);
capable!(SharedBatchlet, Batchlet);
capable!(SharedListener, Listener);
capable!(SharedMapper, PartitionMapper);
capable!(SharedReducer, PartitionReducer);
capable!(SharedCollector, PartitionCollector);
capable!(SharedAnalyzer, PartitionAnalyzer);
capable!(SharedDecider, Decider);
