//! Server error codes carried in error responses.

macro_rules! error_codes {
    ($($name:ident = $value:literal,)+) => {
        /// Error code of an exception reported by a cluster member.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        pub enum ErrorCode {
            $(
                #[allow(missing_docs)]
                $name = $value,
            )+
        }

        impl ErrorCode {
            /// Creates an error code from its wire format value.
            pub fn from_value(value: i32) -> Option<Self> {
                match value {
                    $($value => Some(Self::$name),)+
                    _ => None,
                }
            }
        }
    };
}

error_codes! {
    Undefined = 0,
    ArrayIndexOutOfBounds = 1,
    ArrayStore = 2,
    Authentication = 3,
    Cache = 4,
    CacheLoader = 5,
    CacheNotExists = 6,
    CacheWriter = 7,
    CallerNotMember = 8,
    Cancellation = 9,
    ClassCast = 10,
    ClassNotFound = 11,
    ConcurrentModification = 12,
    ConfigMismatch = 13,
    DistributedObjectDestroyed = 14,
    Eof = 15,
    EntryProcessor = 16,
    Execution = 17,
    Hazelcast = 18,
    HazelcastInstanceNotActive = 19,
    HazelcastOverload = 20,
    HazelcastSerialization = 21,
    Io = 22,
    IllegalArgument = 23,
    IllegalAccessException = 24,
    IllegalAccessError = 25,
    IllegalMonitorState = 26,
    IllegalState = 27,
    IllegalThreadState = 28,
    IndexOutOfBounds = 29,
    Interrupted = 30,
    InvalidAddress = 31,
    InvalidConfiguration = 32,
    MemberLeft = 33,
    NegativeArraySize = 34,
    NoSuchElement = 35,
    NotSerializable = 36,
    NullPointer = 37,
    OperationTimeout = 38,
    PartitionMigrating = 39,
    Query = 40,
    QueryResultSizeExceeded = 41,
    SplitBrainProtection = 42,
    ReachedMaxSize = 43,
    RejectedExecution = 44,
    ResponseAlreadySent = 45,
    RetryableHazelcast = 46,
    RetryableIo = 47,
    Runtime = 48,
    Security = 49,
    Socket = 50,
    StaleSequence = 51,
    TargetDisconnected = 52,
    TargetNotMember = 53,
    Timeout = 54,
    TopicOverload = 55,
    Transaction = 56,
    TransactionNotActive = 57,
    TransactionTimedOut = 58,
    UriSyntax = 59,
    UtfDataFormat = 60,
    UnsupportedOperation = 61,
    WrongTarget = 62,
    Xa = 63,
    AccessControl = 64,
    Login = 65,
    UnsupportedCallback = 66,
    NoDataMember = 67,
    ReplicatedMapCantBeCreated = 68,
    MaxMessageSizeExceeded = 69,
    WanReplicationQueueFull = 70,
    AssertionError = 71,
    OutOfMemoryError = 72,
    StackOverflowError = 73,
    NativeOutOfMemoryError = 74,
    ServiceNotFound = 75,
    StaleTaskId = 76,
    DuplicateTask = 77,
    StaleTask = 78,
    LocalMemberReset = 79,
    IndeterminateOperationState = 80,
    FlakeIdNodeIdOutOfRange = 81,
    TargetNotReplica = 82,
    MutationDisallowed = 83,
    ConsistencyLost = 84,
    SessionExpired = 85,
    WaitKeyCancelled = 86,
    LockAcquireLimitReached = 87,
    LockOwnershipLost = 88,
    CpGroupDestroyed = 89,
    CannotReplicate = 90,
    LeaderDemoted = 91,
    StaleAppendRequest = 92,
    NotLeader = 93,
    VersionMismatch = 94,
    NoSuchMethodError = 95,
    NoSuchMethodException = 96,
    NoSuchFieldError = 97,
    NoSuchFieldException = 98,
    NoClassDefFoundError = 99,
}

impl ErrorCode {
    /// Returns the wire format value for this error code.
    pub fn value(self) -> i32 {
        self as i32
    }

    /// Returns `true` for the membership, migration and transient failures
    /// after which an invocation may be sent again.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::CallerNotMember
                | Self::HazelcastInstanceNotActive
                | Self::MemberLeft
                | Self::PartitionMigrating
                | Self::RetryableHazelcast
                | Self::RetryableIo
                | Self::TargetDisconnected
                | Self::TargetNotMember
                | Self::WrongTarget
                | Self::TargetNotReplica
                | Self::CannotReplicate
        )
    }
}
