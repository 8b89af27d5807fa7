//! Built-in stopword lists and the Chinese segmentation lexicon.

use std::collections::HashSet;
use std::sync::LazyLock;

/// Curated English stop words.
pub(super) static ENGLISH_STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is",
        "it", "its", "of", "on", "that", "the", "to", "was", "were", "will", "with", "this", "but",
        "they", "have", "had", "what", "said", "each", "which", "she", "do", "how", "their", "if",
        "up", "out", "many", "then", "them", "these", "so", "some", "her", "would", "make", "like",
        "into", "him", "time", "two", "more", "go", "no", "way", "could", "my", "than", "first",
        "been", "call", "who", "oil", "sit", "now", "find", "down", "day", "did", "get", "come",
        "made", "may", "part",
    ]
    .into_iter()
    .collect()
});

/// Common Chinese stop words (particles, pronouns, connectives).
pub(super) static CHINESE_STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "的", "了", "在", "是", "我", "有", "和", "就", "不", "人", "都", "一", "一个", "上",
        "也", "很", "到", "说", "要", "去", "你", "会", "着", "没有", "看", "好", "自己", "这",
        "那", "它", "他", "她", "我们", "你们", "他们", "这个", "那个", "什么", "怎么", "为什么",
        "因为", "所以", "但是", "然后", "如果", "虽然", "可是", "而且", "或者", "比如", "关于",
        "对于", "根据", "按照", "除了", "包括", "特别", "尤其", "另外", "首先", "其次", "最后",
        "总之", "因此", "于是", "然而", "不过", "尽管", "即使",
    ]
    .into_iter()
    .collect()
});

/// Lexicon of common Chinese terms for forward maximum matching.
///
/// Tried at lengths 4 down to 2 characters; unmatched characters fall back
/// to single-character or buffered emission depending on configuration.
pub(super) static CHINESE_LEXICON: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "计算机", "人工智能", "机器学习", "深度学习", "神经网络", "算法", "数据", "分析",
        "处理", "系统", "技术", "方法", "模型", "训练", "预测", "优化", "自然语言", "图像识别",
        "语音识别", "推荐系统", "搜索引擎", "大数据", "云计算", "区块链", "物联网", "网络安全",
        "软件工程", "数据库", "编程语言", "开发", "应用", "平台", "框架", "工具", "服务",
        "产品", "用户", "客户", "市场", "商业", "企业", "公司", "团队", "项目", "管理", "运营",
        "策略", "规划", "设计", "创新", "研究",
    ]
    .into_iter()
    .collect()
});
