//! JavaScript injected into captured pages.
//!
//! The page only reports raw facts. Masking, selector ranking and page ids
//! are decided on the Rust side.

/// Runtime binding the recorder script calls with one JSON event per action.
pub const BINDING_NAME: &str = "__genFoodRecord";

/// Upper bound on elements serialized by [`DOM_SNAPSHOT_SCRIPT`].
pub const MAX_SNAPSHOT_NODES: usize = 5000;

/// Installs capture-phase listeners for click, input (debounced), change,
/// submit and Enter/Escape keydown. Idempotent per document.
pub const RECORDER_SCRIPT: &str = r#"
(() => {
    if (window.__genFoodRecorderInstalled) return;
    window.__genFoodRecorderInstalled = true;

    const KEPT = ['id', 'name', 'placeholder', 'type', 'href', 'role', 'aria-label',
                  'data-testid', 'data-test-id', 'data-test'];

    function describe(el) {
        if (!el || !el.tagName) return null;
        const attributes = {};
        for (const name of KEPT) {
            const v = el.getAttribute(name);
            if (v !== null && v !== '') attributes[name] = v;
        }
        const isField = ['INPUT', 'SELECT', 'TEXTAREA'].includes(el.tagName);
        return {
            tag: el.tagName.toLowerCase(),
            text: isField ? '' : (el.textContent || '').trim().substring(0, 100),
            attributes: attributes
        };
    }

    function send(type, el, extra) {
        const binding = window.__genFoodRecord;
        if (typeof binding !== 'function') return;
        const event = Object.assign({
            ts: new Date().toISOString(),
            type: type,
            url: window.location.href,
            element: describe(el)
        }, extra || {});
        try { binding(JSON.stringify(event)); } catch (_) {}
    }

    document.addEventListener('click', (e) => send('click', e.target), true);

    let inputTimer = null;
    document.addEventListener('input', (e) => {
        const el = e.target;
        clearTimeout(inputTimer);
        inputTimer = setTimeout(() => {
            send('input', el, { value: String(el.value || '').substring(0, 100) });
        }, 300);
    }, true);

    document.addEventListener('change', (e) => {
        const el = e.target;
        let value = null;
        if (el.type === 'checkbox' || el.type === 'radio') {
            value = !!el.checked;
        } else if (el.tagName === 'SELECT') {
            const opt = el.options[el.selectedIndex];
            value = opt ? opt.text : el.value;
        } else {
            value = String(el.value || '').substring(0, 100);
        }
        send('change', el, { value: value });
    }, true);

    document.addEventListener('submit', (e) => send('submit', e.target), true);

    document.addEventListener('keydown', (e) => {
        if (e.key === 'Enter' || e.key === 'Escape') {
            send('keydown', e.target, { key: e.key });
        }
    }, true);
})();
"#;

/// Serializes the element tree in document order with parent indices.
///
/// At most [`MAX_SNAPSHOT_NODES`] elements are sent; `total` reports the
/// document's real element count so the caller can tell a cut snapshot.
///
/// Attribute values are capped at 200 chars; `value` and `style` are left
/// out of `attributes`. Form fields carry their live value and label text.
pub const DOM_SNAPSHOT_SCRIPT: &str = r#"
(() => {
    const MAX_NODES = 5000;
    const INTERACTIVE = 'button, input, select, textarea, a[href], [role], [onclick], ' +
        '[contenteditable="true"], [data-testid], [data-test-id], [data-test]';

    const everything = document.querySelectorAll('*');
    const all = Array.from(everything).slice(0, MAX_NODES);
    const index = new Map();
    all.forEach((el, i) => index.set(el, i));

    function labelFor(el) {
        if (el.id) {
            const byFor = document.querySelector('label[for="' + CSS.escape(el.id) + '"]');
            if (byFor) return (byFor.textContent || '').trim().substring(0, 100);
        }
        const wrapping = el.closest('label');
        return wrapping ? (wrapping.textContent || '').trim().substring(0, 100) : null;
    }

    const nodes = all.map((el) => {
        const attributes = {};
        for (const attr of Array.from(el.attributes)) {
            if (attr.name === 'value' || attr.name === 'style') continue;
            attributes[attr.name] = attr.value.substring(0, 200);
        }
        const isField = ['INPUT', 'SELECT', 'TEXTAREA'].includes(el.tagName);
        const parent = el.parentElement && index.has(el.parentElement)
            ? index.get(el.parentElement) : null;
        return {
            tag: el.tagName.toLowerCase(),
            parent: parent,
            attributes: attributes,
            text: !isField && el.matches(INTERACTIVE)
                ? (el.textContent || '').trim().substring(0, 100) : '',
            value: isField ? String(el.value == null ? '' : el.value) : null,
            label: isField ? labelFor(el) : null
        };
    });

    return {
        url: window.location.href,
        title: document.title || '',
        likely_spa: !!(window.React || window.Vue || window.angular ||
                       window.__NUXT__ || window.__NEXT_DATA__),
        nodes: nodes,
        total: everything.length,
        truncated: everything.length > all.length
    };
})()
"#;
